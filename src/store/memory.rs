use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::store_model::{Credential, CreditCardEntry, PasswordEntry};
use crate::store::{CreditCardStore, PasswordStore};

#[derive(Debug, Clone)]
struct StoredPassword {
    credential: Credential,
    use_count: u64,
    last_used: u64,
}

/// Process-local password store. Used by scenarios and tests; failures can
/// be injected to exercise the alert path.
#[derive(Debug, Default)]
pub struct InMemoryPasswordStore {
    entries: RwLock<Vec<StoredPassword>>,
    clock: Mutex<u64>,
    failure: Mutex<Option<StoreError>>,
}

impl InMemoryPasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let store = Self::new();
        store.entries.write().extend(credentials.into_iter().map(|credential| StoredPassword {
            credential,
            use_count: 0,
            last_used: 0,
        }));
        store
    }

    /// The next store call fails with `error`.
    pub fn fail_next(&self, error: StoreError) {
        *self.failure.lock() = Some(error);
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.entries.read().iter().map(|e| e.credential.clone()).collect()
    }

    pub fn use_count(&self, host: &str, username: &str) -> u64 {
        self.entries
            .read()
            .iter()
            .find(|e| e.credential.host == host && e.credential.username == username)
            .map(|e| e.use_count)
            .unwrap_or(0)
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn tick(&self) -> u64 {
        let mut clock = self.clock.lock();
        *clock += 1;
        *clock
    }
}

/// `accounts.example.com` may use credentials saved for `example.com`.
fn host_matches(entry_host: &str, host: &str) -> bool {
    entry_host == host || host.ends_with(&format!(".{}", entry_host))
}

impl PasswordStore for InMemoryPasswordStore {
    fn entries_for_host(&self, host: &str) -> Result<Vec<PasswordEntry>, StoreError> {
        self.check_failure()?;
        let entries = self.entries.read();
        let mut matching: Vec<&StoredPassword> = entries
            .iter()
            .filter(|e| host_matches(&e.credential.host, host))
            .collect();
        matching.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(matching.into_iter().map(|e| e.credential.entry()).collect())
    }

    fn password(&self, host: &str, username: &str) -> Result<String, StoreError> {
        self.check_failure()?;
        self.entries
            .read()
            .iter()
            .find(|e| e.credential.host == host && e.credential.username == username)
            .map(|e| e.credential.password.clone())
            .ok_or_else(|| StoreError::Database(format!("no password for {}@{}", username, host)))
    }

    fn save(&self, host: &str, username: &str, password: &str) -> Result<PasswordEntry, StoreError> {
        self.check_failure()?;
        let now = self.tick();
        let mut entries = self.entries.write();
        match entries
            .iter_mut()
            .find(|e| e.credential.host == host && e.credential.username == username)
        {
            Some(existing) => {
                existing.credential.password = password.to_string();
                existing.last_used = now;
            }
            None => entries.push(StoredPassword {
                credential: Credential {
                    host: host.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                },
                use_count: 0,
                last_used: now,
            }),
        }
        Ok(PasswordEntry::new(host, username))
    }

    fn mark_used(&self, entry: &PasswordEntry) -> Result<(), StoreError> {
        self.check_failure()?;
        let now = self.tick();
        if let Some(stored) = self
            .entries
            .write()
            .iter_mut()
            .find(|e| e.credential.entry() == *entry)
        {
            stored.use_count += 1;
            stored.last_used = now;
        }
        Ok(())
    }

    fn mark_deleted(&self, host: &str, username: &str) -> Result<(), StoreError> {
        self.check_failure()?;
        self.entries
            .write()
            .retain(|e| !(e.credential.host == host && e.credential.username == username));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCreditCardStore {
    cards: RwLock<Vec<CreditCardEntry>>,
    used: RwLock<Vec<Uuid>>,
    failure: Mutex<Option<StoreError>>,
}

impl InMemoryCreditCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(cards: impl IntoIterator<Item = CreditCardEntry>) -> Self {
        let store = Self::new();
        store.cards.write().extend(cards.into_iter().map(|mut card| {
            card.database_id.get_or_insert_with(Uuid::new_v4);
            card
        }));
        store
    }

    pub fn fail_next(&self, error: StoreError) {
        *self.failure.lock() = Some(error);
    }

    pub fn times_used(&self, id: Uuid) -> usize {
        self.used.read().iter().filter(|u| **u == id).count()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl CreditCardStore for InMemoryCreditCardStore {
    fn fetch_all(&self) -> Result<Vec<CreditCardEntry>, StoreError> {
        self.check_failure()?;
        Ok(self.cards.read().clone())
    }

    fn save(&self, entry: &CreditCardEntry) -> Result<CreditCardEntry, StoreError> {
        self.check_failure()?;
        let mut cards = self.cards.write();
        if let Some(id) = entry.database_id {
            if let Some(existing) = cards.iter_mut().find(|c| c.database_id == Some(id)) {
                *existing = entry.clone();
                return Ok(entry.clone());
            }
        }
        let mut stored = entry.clone();
        stored.database_id = Some(entry.database_id.unwrap_or_else(Uuid::new_v4));
        cards.push(stored.clone());
        Ok(stored)
    }

    fn mark_used(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_failure()?;
        self.used.write().push(id);
        Ok(())
    }

    fn mark_deleted(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_failure()?;
        self.cards.write().retain(|c| c.database_id != Some(id));
        Ok(())
    }
}
