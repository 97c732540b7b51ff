//! Persistence ports.
//!
//! The workflow never sees a connection pool. It asks a [`Store`] for a
//! [`UnitOfWork`], runs directory lookups and relation writes through that
//! handle, and finishes it with `commit` or `rollback`. A unit of work that
//! is dropped without either is rolled back by the adapter.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Friend, PhoneNumber, Relation, User, UserId};

/// Phone-number-indexed lookup of registered users.
#[async_trait]
pub trait UserDirectory: Send {
    /// `Ok(None)` when no user owns the number; `AmbiguousMatch` when more
    /// than one does.
    async fn find_by_phone(&mut self, phone_number: &PhoneNumber) -> Result<Option<User>>;

    /// Display name of `user_id`, or `Ok(None)` if the user does not exist.
    async fn get_name(&mut self, user_id: UserId) -> Result<Option<String>>;
}

/// Append-only storage of relation edges.
#[async_trait]
pub trait RelationStore: Send {
    async fn save(&mut self, relation: &Relation) -> Result<()>;

    /// Relations owned by `owner` joined with the target's phone number, in
    /// insertion order. Edges whose target no longer exists are excluded.
    async fn find_friends_of(&mut self, owner: UserId) -> Result<Vec<Friend>>;
}

/// A transactional scope over the directory and the relation store.
#[async_trait]
pub trait UnitOfWork: UserDirectory + RelationStore {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Entry point to a backing store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Unit: UnitOfWork;
    type Session: UserDirectory + RelationStore;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Unit>;

    /// Acquire a non-transactional handle for read paths.
    async fn session(&self) -> Result<Self::Session>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;
}
