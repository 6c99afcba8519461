use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::memory::UserTable;
use super::store::{CredentialStore, User, UserQuery, UserUpdate};
use crate::modules::error::{AccountError, AccountResult};
use crate::modules::utils::logging::log_data_operation;

/// Credential store persisted as one JSON document.
///
/// The whole table is loaded once and rewritten after every mutation; the
/// write goes to a temporary file in the same directory and is renamed over
/// the old document so readers never see a half-written file.
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<UserTable>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> AccountResult<Self> {
        let path = path.into();
        let table = load_table(&path)?;
        log::debug!(
            "Opened user store {} with {} users",
            path.display(),
            table.users.len()
        );
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> AccountResult<MutexGuard<'_, UserTable>> {
        self.table
            .lock()
            .map_err(|_| AccountError::Storage("User table lock poisoned".to_string()))
    }

    fn persist(&self, table: &UserTable) -> AccountResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let data = serde_json::to_vec_pretty(table)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| AccountError::Io(e.error))?;
        Ok(())
    }
}

fn load_table(path: &Path) -> AccountResult<UserTable> {
    match fs::read(path) {
        Ok(data) if data.is_empty() => Ok(UserTable::default()),
        Ok(data) => serde_json::from_slice(&data).map_err(|e| {
            AccountError::Storage(format!("Failed to parse {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserTable::default()),
        Err(e) => Err(AccountError::Io(e)),
    }
}

impl CredentialStore for JsonFileStore {
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
        let mut table = self.lock()?;
        // Work on a copy so a failed write leaves memory and disk in agreement
        let mut next = table.clone();
        let updated = next.find_one_and_update(filter, update);

        if let Some(user) = &updated {
            if let Err(e) = self.persist(&next) {
                log_data_operation("update", &user.email, "user_store", false, Some(&e.message()));
                return Err(e);
            }
            *table = next;
        }
        Ok(updated)
    }

    fn save(&self, user: &User) -> AccountResult<User> {
        let mut table = self.lock()?;
        let mut next = table.clone();
        let stored = next.save(user)?;

        if let Err(e) = self.persist(&next) {
            log_data_operation("save", &stored.email, "user_store", false, Some(&e.message()));
            return Err(e);
        }
        *table = next;
        Ok(stored)
    }
}
