use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::protocol::field_model::{AutofillAction, AutofillGroup};
use crate::protocol::messages::{FrameRef, Rect};
use crate::store::store_model::{CreditCardEntry, PasswordEntry};

/// What the password menu offers for the focused field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MenuOptions {
    Login,
    AmbiguousPassword,
    /// Empty new-password field: only the password suggestion.
    CreateAccount,
    /// New-password field that already has content.
    CreateAccountWithMenu,
}

impl MenuOptions {
    pub fn shows_existing_credentials(&self) -> bool {
        matches!(self, MenuOptions::Login | MenuOptions::AmbiguousPassword)
    }

    pub fn suggests_new_password(&self) -> bool {
        !matches!(self, MenuOptions::Login)
    }

    /// `None` when the field gets no password menu at all.
    pub fn for_field(element_id: &str, empty_field: bool, group: &AutofillGroup) -> Option<MenuOptions> {
        let role = group.field(element_id).map(|f| f.role);
        if group.is_ambiguous {
            if let Some(role) = role {
                return Some(if role.is_password() {
                    MenuOptions::AmbiguousPassword
                } else {
                    MenuOptions::Login
                });
            }
        }
        match group.action {
            AutofillAction::CreateAccount => {
                if !role.is_some_and(|r| r.is_password()) {
                    return None;
                }
                Some(if empty_field {
                    MenuOptions::CreateAccount
                } else {
                    MenuOptions::CreateAccountWithMenu
                })
            }
            AutofillAction::Login => Some(MenuOptions::Login),
            AutofillAction::Payment | AutofillAction::PersonalInfo => None,
        }
    }
}

/// Ids whose emptiness decides how the menu opens: every password field of
/// the group for a password field, the field alone otherwise.
pub fn similar_field_ids(element_id: &str, group: &AutofillGroup) -> Vec<String> {
    match group.field(element_id).map(|f| f.role) {
        Some(role) if role.is_password() => group.ids_with_role(|r| r.is_password()),
        _ => vec![element_id.to_string()],
    }
}

/// Where overlays attach. `updates` follows the field as frames scroll.
#[derive(Debug, Clone)]
pub struct MenuAnchor {
    pub element_id: String,
    pub frame: FrameRef,
    pub rect: Option<Rect>,
    pub updates: watch::Receiver<Option<Rect>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MenuViewModel {
    Passwords {
        host: String,
        options: MenuOptions,
        entries: Vec<PasswordEntry>,
        suggested: Option<PasswordEntry>,
    },
    CreditCards {
        entries: Vec<CreditCardEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SavePrompt {
    SavePassword { host: String, username: String },
    UpdatePassword { host: String, username: String },
    SaveCreditCard { description: String },
    UpdateCreditCard { description: String },
}

impl SavePrompt {
    pub fn message(&self) -> String {
        match self {
            SavePrompt::SavePassword { .. } => "Would you like to save this password?".to_string(),
            SavePrompt::UpdatePassword { username, .. } => {
                format!("Would you like to update the saved password for {}?", username)
            }
            SavePrompt::SaveCreditCard { .. } => "Would you like to save this credit card?".to_string(),
            SavePrompt::UpdateCreditCard { .. } => "Would you like to update this credit card?".to_string(),
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(
            self,
            SavePrompt::UpdatePassword { .. } | SavePrompt::UpdateCreditCard { .. }
        )
    }
}

/// Native overlay surface: draws the icon and menus, asks the user.
#[async_trait]
pub trait AutofillMenu: Send + Sync {
    async fn show_icon(&self, anchor: &MenuAnchor, action: AutofillAction);

    async fn show_menu(&self, anchor: &MenuAnchor, model: MenuViewModel);

    async fn dismiss_menu(&self);

    /// Remove icon and menu.
    async fn dismiss(&self);

    /// `true` when the user accepted.
    async fn confirm_save(&self, prompt: &SavePrompt) -> bool;

    async fn show_alert(&self, error: &StoreError);
}
