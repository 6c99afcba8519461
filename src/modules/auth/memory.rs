use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::store::{CredentialStore, User, UserQuery, UserUpdate};
use crate::modules::error::{AccountError, AccountResult};

/// All users keyed by id, with the email-uniqueness check every store shares
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct UserTable {
    pub users: HashMap<String, User>,
}

impl UserTable {
    pub fn find_one_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
    }

    pub fn find(&self, query: &UserQuery, skip: usize, limit: usize) -> Vec<User> {
        self.users
            .values()
            .filter(|user| query.matches(user))
            .sorted_by(|a, b| User::listing_order(a, b))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self, query: &UserQuery) -> u64 {
        self.users.values().filter(|user| query.matches(user)).count() as u64
    }

    pub fn find_page(&self, query: &UserQuery, skip: usize, limit: usize) -> (Vec<User>, u64) {
        (self.find(query, skip, limit), self.count(query))
    }

    /// Apply the update to the first match in listing order
    pub fn find_one_and_update(&mut self, filter: &UserQuery, update: &UserUpdate) -> Option<User> {
        if let Some(id) = &filter.id {
            let user = self.users.get_mut(id).filter(|user| filter.matches(user))?;
            update.apply(user);
            return Some(user.clone());
        }

        let id = self
            .users
            .values()
            .filter(|user| filter.matches(user))
            .sorted_by(|a, b| User::listing_order(a, b))
            .map(|user| user.id.clone())
            .next()?;

        let user = self.users.get_mut(&id)?;
        update.apply(user);
        Some(user.clone())
    }

    /// Check-and-insert: fails if another user already owns the email
    pub fn save(&mut self, user: &User) -> AccountResult<User> {
        if let Some(existing) = self.find_one_by_email(&user.email) {
            if existing.id != user.id {
                return Err(AccountError::EmailTaken);
            }
        }

        let mut stored = user.clone();
        stored.email = stored.email.trim().to_lowercase();
        self.users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }
}

/// In-process credential store
#[derive(Default)]
pub struct MemoryStore {
    table: Mutex<UserTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|table| table.users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> AccountResult<MutexGuard<'_, UserTable>> {
        self.table
            .lock()
            .map_err(|_| AccountError::Storage("User table lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryStore {
    fn find_one_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        Ok(self.lock()?.find_one_by_email(email).cloned())
    }

    fn find_by_id(&self, id: &str) -> AccountResult<Option<User>> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn find(&self, query: &UserQuery, skip: usize, limit: usize) -> AccountResult<Vec<User>> {
        Ok(self.lock()?.find(query, skip, limit))
    }

    fn count(&self, query: &UserQuery) -> AccountResult<u64> {
        Ok(self.lock()?.count(query))
    }

    fn find_page(
        &self,
        query: &UserQuery,
        skip: usize,
        limit: usize,
    ) -> AccountResult<(Vec<User>, u64)> {
        Ok(self.lock()?.find_page(query, skip, limit))
    }

    fn find_one_and_update(
        &self,
        filter: &UserQuery,
        update: &UserUpdate,
    ) -> AccountResult<Option<User>> {
        Ok(self.lock()?.find_one_and_update(filter, update))
    }

    fn save(&self, user: &User) -> AccountResult<User> {
        self.lock()?.save(user)
    }
}
