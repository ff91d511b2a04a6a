pub mod memory;
pub mod store_model;

use uuid::Uuid;

use crate::error::StoreError;
use crate::store::store_model::{Credential, CreditCardEntry, PasswordEntry};

/// Credential storage engine. Encryption happens behind this seam, which is
/// why reading a password can fail independently of listing entries.
pub trait PasswordStore: Send + Sync {
    /// Entries usable on `host`, most recently used first.
    fn entries_for_host(&self, host: &str) -> Result<Vec<PasswordEntry>, StoreError>;

    fn password(&self, host: &str, username: &str) -> Result<String, StoreError>;

    fn save(&self, host: &str, username: &str, password: &str) -> Result<PasswordEntry, StoreError>;

    fn mark_used(&self, entry: &PasswordEntry) -> Result<(), StoreError>;

    fn mark_deleted(&self, host: &str, username: &str) -> Result<(), StoreError>;

    fn best_matching_entry(&self, host: &str, username: &str) -> Result<Option<PasswordEntry>, StoreError> {
        Ok(self
            .entries_for_host(host)?
            .into_iter()
            .find(|e| e.username == username))
    }

    fn find(&self, host: &str, username: &str) -> Result<Option<Credential>, StoreError> {
        let Some(entry) = self.best_matching_entry(host, username)? else {
            return Ok(None);
        };
        let password = self.password(&entry.host, &entry.username)?;
        Ok(Some(Credential {
            host: entry.host,
            username: entry.username,
            password,
        }))
    }
}

pub trait CreditCardStore: Send + Sync {
    fn fetch_all(&self) -> Result<Vec<CreditCardEntry>, StoreError>;

    /// Insert when `database_id` is `None`, update otherwise. Returns the
    /// stored entry with its id.
    fn save(&self, entry: &CreditCardEntry) -> Result<CreditCardEntry, StoreError>;

    fn mark_used(&self, id: Uuid) -> Result<(), StoreError>;

    fn mark_deleted(&self, id: Uuid) -> Result<(), StoreError>;
}
