use crate::builder::credentials::Credentials;
use crate::error::StoreError;
use crate::store::PasswordStore;
use crate::store::store_model::{CreditCardEntry, PasswordEntry};

/// What to do with credentials that reached save evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSaveAction {
    /// Ask, then store under the page host.
    Save,
    /// Generated passwords are stored without asking.
    SaveSilently,
    /// The store already has this username with another password.
    Update(PasswordEntry),
}

/// `Ok(None)` when nothing needs saving: no password, or the store already
/// holds exactly this password.
pub fn password_save_action(
    store: &dyn PasswordStore,
    host: &str,
    credentials: &Credentials,
) -> Result<Option<PasswordSaveAction>, StoreError> {
    let Some(password) = credentials.password.as_deref() else {
        return Ok(None);
    };
    let username = credentials.username.as_deref().unwrap_or("");

    if let Some(entry) = store.best_matching_entry(host, username)? {
        let stored = store.password(&entry.host, &entry.username)?;
        if stored == password {
            return Ok(None);
        }
        return Ok(Some(PasswordSaveAction::Update(entry)));
    }

    Ok(Some(if credentials.ask_save_confirmation {
        PasswordSaveAction::Save
    } else {
        PasswordSaveAction::SaveSilently
    }))
}

/// Attach a typed card to the stored card with the same number. `None`
/// when the stored card already matches in every field.
pub fn merge_with_stored_card(mut card: CreditCardEntry, stored: &[CreditCardEntry]) -> Option<CreditCardEntry> {
    if card.database_id.is_none() {
        if let Some(existing) = stored.iter().find(|c| c.card_number == card.card_number) {
            if existing.same_card(&card) {
                return None;
            }
            card.database_id = existing.database_id;
            card.description = existing.description.clone();
        }
    }
    if card.description.is_empty() {
        card.description = card.holder.clone();
    }
    Some(card)
}
