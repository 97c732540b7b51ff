//! Domain types shared by the store, the service and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const MAX_PHONE_LEN: usize = 32;

/// Identity of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    /// Wrap a raw id. Ids must be positive.
    pub fn new(raw: i32) -> Result<Self, Error> {
        if raw <= 0 {
            return Err(Error::invalid_input(format!(
                "user id must be positive, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i32 = s
            .parse()
            .map_err(|_| Error::invalid_input(format!("malformed user id {s:?}")))?;
        Self::new(raw)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A phone number as stored in the user directory.
///
/// Numbers are compared verbatim; parsing only trims whitespace and rejects
/// values that could never match a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input("phone number is empty"));
        }
        if trimmed.len() > MAX_PHONE_LEN {
            return Err(Error::invalid_input(format!(
                "phone number longer than {MAX_PHONE_LEN} characters"
            )));
        }
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_input(format!(
                "phone number {trimmed:?} must contain only digits and an optional leading '+'"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user, as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: UserId,
    pub name: String,
    pub phone_number: String,
}

/// One entry of an uploaded contact list. `name` is a display hint and is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone_number: phone_number.into(),
        }
    }
}

/// Validate every contact's phone number, in order, before touching the store.
pub fn validate_contacts(contacts: &[Contact]) -> Result<Vec<PhoneNumber>, Error> {
    contacts
        .iter()
        .enumerate()
        .map(|(index, contact)| {
            PhoneNumber::parse(&contact.phone_number).map_err(|err| match err {
                Error::InvalidInput { message } => {
                    Error::invalid_input(format!("contact #{index}: {message}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Directed edge: `user_id`'s contact list matched `relation_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub user_id: UserId,
    pub relation_user_id: UserId,
}

/// Read model of a relation joined with the target's phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: UserId,
    pub relation_user_id: UserId,
    pub phone_number: String,
}
