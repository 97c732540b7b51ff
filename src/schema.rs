//! Table layout and the SQL rendered from it.
//!
//! Table names come from configuration and are validated once, when
//! [`Statements`] is built, so nothing here depends on process-wide state.

use serde::Deserialize;

use crate::error::Error;

/// Names of the two tables the core reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub users: String,
    pub relations: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: "users".into(),
            relations: "relations".into(),
        }
    }
}

/// Prepared SQL text for every store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub find_user_by_phone: String,
    pub user_name: String,
    pub insert_relation: String,
    pub friends_of: String,
    pub ping: &'static str,
}

impl Statements {
    pub fn new(tables: &Tables) -> Result<Self, Error> {
        let users = quote_identifier(&tables.users)?;
        let relations = quote_identifier(&tables.relations)?;

        Ok(Self {
            // LIMIT 2: one row is a match, two is an integrity problem.
            find_user_by_phone: format!(
                r#"SELECT "user_id", "name", "phone_number" FROM {users} WHERE "phone_number" = $1 LIMIT 2"#
            ),
            user_name: format!(r#"SELECT "name" FROM {users} WHERE "user_id" = $1"#),
            insert_relation: format!(
                r#"INSERT INTO {relations} ("user_id", "relation_user_id") VALUES ($1, $2)"#
            ),
            friends_of: format!(
                r#"SELECT r."user_id", r."relation_user_id", u."phone_number" FROM {relations} r INNER JOIN {users} u ON u."user_id" = r."relation_user_id" WHERE r."user_id" = $1 ORDER BY r."relation_id""#
            ),
            ping: "SELECT 1",
        })
    }
}

fn quote_identifier(name: &str) -> Result<String, Error> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || name.len() > 63 {
        return Err(Error::invalid_input(format!(
            "invalid table name {name:?}"
        )));
    }
    Ok(format!("\"{name}\""))
}
