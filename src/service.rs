//! Contact matching workflow and the read paths over its relations.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::model::{validate_contacts, Contact, Friend, PhoneNumber, Relation, UserId};
use crate::ports::{RelationStore, Store, UnitOfWork, UserDirectory};

/// Outcome of a successful `save_contacts` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub submitted: usize,
    pub matched: usize,
}

/// Operations the transport layer drives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactsPort: Send + Sync {
    /// Match `contacts` against the directory and persist one relation per
    /// match, all or nothing.
    async fn save_contacts(&self, owner: UserId, contacts: Vec<Contact>) -> Result<SaveReport>;

    async fn list_friends(&self, owner: UserId) -> Result<Vec<Friend>>;

    async fn get_name(&self, user_id: UserId) -> Result<String>;

    async fn health(&self) -> Result<()>;
}

pub struct ContactService<S> {
    store: S,
}

impl<S: Store> ContactService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store> ContactsPort for ContactService<S> {
    #[instrument(skip(self, contacts), fields(contacts = contacts.len()))]
    async fn save_contacts(&self, owner: UserId, contacts: Vec<Contact>) -> Result<SaveReport> {
        let phone_numbers = validate_contacts(&contacts)?;
        if phone_numbers.is_empty() {
            debug!("empty contact list, nothing to match");
            return Ok(SaveReport {
                submitted: 0,
                matched: 0,
            });
        }

        let mut unit = self.store.begin().await?;
        match match_and_write(&mut unit, owner, &phone_numbers).await {
            Ok(matched) => {
                unit.commit().await?;
                debug!(matched, "committed");
                let report = SaveReport {
                    submitted: phone_numbers.len(),
                    matched,
                };
                info!(submitted = report.submitted, matched, "contacts saved");
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    // The transaction is discarded when the connection is
                    // returned either way; report the first failure.
                    warn!(error = %rollback_err, "rollback failed");
                }
                debug!(error = %err, "rolled back");
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_friends(&self, owner: UserId) -> Result<Vec<Friend>> {
        let mut session = self.store.session().await?;
        session.find_friends_of(owner).await
    }

    #[instrument(skip(self))]
    async fn get_name(&self, user_id: UserId) -> Result<String> {
        let mut session = self.store.session().await?;
        session
            .get_name(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {user_id}")))
    }

    async fn health(&self) -> Result<()> {
        self.store.ping().await
    }
}

/// Resolve every phone number, then write one relation per match, in input
/// order. Runs entirely inside the caller's unit of work.
async fn match_and_write<U>(
    unit: &mut U,
    owner: UserId,
    phone_numbers: &[PhoneNumber],
) -> Result<usize>
where
    U: UserDirectory + RelationStore,
{
    debug!("resolving");
    let mut targets = Vec::with_capacity(phone_numbers.len());
    for phone_number in phone_numbers {
        match unit.find_by_phone(phone_number).await? {
            Some(user) => targets.push(user.user_id),
            None => debug!(%phone_number, "no registered user, skipping"),
        }
    }

    debug!(matched = targets.len(), "writing");
    for &relation_user_id in &targets {
        unit.save(&Relation {
            user_id: owner,
            relation_user_id,
        })
        .await?;
    }
    Ok(targets.len())
}
