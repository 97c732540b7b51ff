//! In-memory store with transactional staging and fault injection.
//!
//! Relation writes made through a [`MemoryUnit`] are staged locally and
//! only become visible on `commit`; dropping the unit discards them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{Friend, PhoneNumber, Relation, User, UserId};
use crate::ports::{RelationStore, Store, UnitOfWork, UserDirectory};

/// What an injected relation-write fault does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFault {
    Fail(Error),
    /// Never resolve, to exercise cancellation.
    Stall,
}

#[derive(Debug, Default)]
struct State {
    users: Vec<User>,
    relations: Vec<Relation>,
    unavailable: bool,
    lookup_faults: HashMap<String, Error>,
    write_faults: HashMap<usize, WriteFault>,
    writes_attempted: usize,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Phone numbers are not required to be unique so that
    /// ambiguous directories can be modelled.
    pub fn with_user(self, user_id: i32, name: &str, phone_number: &str) -> Self {
        self.lock().users.push(User {
            user_id: UserId::new(user_id).unwrap_or_else(|err| panic!("test user id: {err}")),
            name: name.to_owned(),
            phone_number: phone_number.to_owned(),
        });
        self
    }

    /// Remove a user, leaving any relations that point at it in place.
    pub fn remove_user(&self, user_id: UserId) {
        self.lock().users.retain(|user| user.user_id != user_id);
    }

    /// Inject a fault on the `nth` relation write (1-based, counted across
    /// the store's lifetime).
    pub fn fault_on_write(&self, nth: usize, fault: WriteFault) {
        self.lock().write_faults.insert(nth, fault);
    }

    /// Fail every lookup of `phone_number` with `error`.
    pub fn fault_on_lookup(&self, phone_number: &str, error: Error) {
        self.lock()
            .lookup_faults
            .insert(phone_number.to_owned(), error);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Committed relations in insertion order.
    pub fn relations(&self) -> Vec<Relation> {
        self.lock().relations.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the store from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.lock().unavailable {
            return Err(Error::store_unavailable("memory store marked unavailable"));
        }
        Ok(())
    }

    fn find_by_phone(&self, phone_number: &PhoneNumber) -> Result<Option<User>> {
        self.check_available()?;
        let state = self.lock();
        if let Some(err) = state.lookup_faults.get(phone_number.as_str()) {
            return Err(err.clone());
        }
        let mut matches = state
            .users
            .iter()
            .filter(|user| user.phone_number == phone_number.as_str());
        match (matches.next(), matches.next()) {
            (None, _) => Ok(None),
            (Some(user), None) => Ok(Some(user.clone())),
            (Some(_), Some(_)) => Err(Error::ambiguous_match(phone_number.as_str())),
        }
    }

    fn get_name(&self, user_id: UserId) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.user_id == user_id)
            .map(|user| user.name.clone()))
    }

    fn friends_of(&self, owner: UserId, staged: &[Relation]) -> Result<Vec<Friend>> {
        self.check_available()?;
        let state = self.lock();
        let friends = state
            .relations
            .iter()
            .chain(staged)
            .filter(|relation| relation.user_id == owner)
            .filter_map(|relation| {
                state
                    .users
                    .iter()
                    .find(|user| user.user_id == relation.relation_user_id)
                    .map(|user| Friend {
                        user_id: relation.user_id,
                        relation_user_id: relation.relation_user_id,
                        phone_number: user.phone_number.clone(),
                    })
            })
            .collect();
        Ok(friends)
    }

    /// Validate a write and return the fault registered for it, if any.
    fn attempt_write(&self, relation: &Relation) -> Result<Option<WriteFault>> {
        self.check_available()?;
        let mut state = self.lock();
        state.writes_attempted += 1;
        let attempt = state.writes_attempted;
        if let Some(fault) = state.write_faults.remove(&attempt) {
            return Ok(Some(fault));
        }
        if !state.users.iter().any(|user| user.user_id == relation.user_id) {
            return Err(Error::constraint_violation(format!(
                "owner {} does not exist",
                relation.user_id
            )));
        }
        Ok(None)
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Unit = MemoryUnit;
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemoryUnit> {
        self.check_available()?;
        Ok(MemoryUnit {
            store: self.clone(),
            staged: Vec::new(),
        })
    }

    async fn session(&self) -> Result<MemorySession> {
        self.check_available()?;
        Ok(MemorySession {
            store: self.clone(),
        })
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

pub struct MemoryUnit {
    store: MemoryStore,
    staged: Vec<Relation>,
}

impl Drop for MemoryUnit {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            self.store.lock().rollbacks += 1;
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUnit {
    async fn find_by_phone(&mut self, phone_number: &PhoneNumber) -> Result<Option<User>> {
        self.store.find_by_phone(phone_number)
    }

    async fn get_name(&mut self, user_id: UserId) -> Result<Option<String>> {
        self.store.get_name(user_id)
    }
}

#[async_trait]
impl RelationStore for MemoryUnit {
    async fn save(&mut self, relation: &Relation) -> Result<()> {
        match self.store.attempt_write(relation)? {
            None => {
                self.staged.push(*relation);
                Ok(())
            }
            Some(WriteFault::Fail(err)) => Err(err),
            Some(WriteFault::Stall) => std::future::pending().await,
        }
    }

    async fn find_friends_of(&mut self, owner: UserId) -> Result<Vec<Friend>> {
        self.store.friends_of(owner, &self.staged)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn commit(mut self) -> Result<()> {
        self.store.check_available()?;
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.store.lock();
        state.relations.extend(staged);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.staged.clear();
        self.store.lock().rollbacks += 1;
        Ok(())
    }
}

pub struct MemorySession {
    store: MemoryStore,
}

#[async_trait]
impl UserDirectory for MemorySession {
    async fn find_by_phone(&mut self, phone_number: &PhoneNumber) -> Result<Option<User>> {
        self.store.find_by_phone(phone_number)
    }

    async fn get_name(&mut self, user_id: UserId) -> Result<Option<String>> {
        self.store.get_name(user_id)
    }
}

#[async_trait]
impl RelationStore for MemorySession {
    async fn save(&mut self, relation: &Relation) -> Result<()> {
        if self.store.attempt_write(relation)?.is_some() {
            return Err(Error::internal("faults apply to transactional writes only"));
        }
        self.store.lock().relations.push(*relation);
        Ok(())
    }

    async fn find_friends_of(&mut self, owner: UserId) -> Result<Vec<Friend>> {
        self.store.friends_of(owner, &[])
    }
}
