use serde::Serialize;

use crate::builder::host::minimized_host;
use crate::store::store_model::PasswordEntry;

/// Credentials accumulated on the current page, as handed to save evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ask_save_confirmation: bool,
    pub has_user_input: bool,
    pub generated_password: bool,
}

#[derive(Debug, Clone, Default)]
struct TrackedValue {
    value: Option<String>,
    from_user: bool,
}

impl TrackedValue {
    /// Empty values never overwrite; engine values never overwrite user input.
    fn merge(&mut self, value: Option<&str>, user_input: bool) -> bool {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return false;
        };
        if self.from_user && !user_input {
            return false;
        }
        self.value = Some(value.to_string());
        self.from_user = user_input;
        true
    }

    fn force(&mut self, value: &str) {
        self.value = Some(value.to_string());
        self.from_user = false;
    }
}

#[derive(Debug, Default)]
pub struct CredentialsBuilder {
    host: Option<String>,
    username: TrackedValue,
    password: TrackedValue,
    autofilled_password: Option<String>,
    generated_password: Option<String>,
    saved_password: Option<String>,
    has_user_input: bool,
}

impl CredentialsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_page(&mut self, url: &str) {
        *self = CredentialsBuilder {
            host: minimized_host(url),
            ..Self::default()
        };
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn has_user_input(&self) -> bool {
        self.has_user_input
    }

    pub fn update_values(&mut self, username: Option<&str>, password: Option<&str>, user_input: bool) {
        let username_changed = self.username.merge(username, user_input);
        let password_changed = self.password.merge(password, user_input);
        if user_input && (username_changed || password_changed) {
            self.has_user_input = true;
        }
    }

    /// Values filled by the engine from a stored entry of `host`.
    pub fn autofill(&mut self, host: &str, username: &str, password: &str) {
        self.host = Some(host.to_string());
        self.username.force(username);
        self.password.force(password);
        self.autofilled_password = Some(password.to_string());
    }

    pub fn store_generated_password(&mut self, password: &str) {
        self.password.force(password);
        self.generated_password = Some(password.to_string());
    }

    pub fn current(&self) -> Credentials {
        let password = self.password.value.clone();
        let generated = password.is_some() && password == self.generated_password;
        let autofilled = password.is_some() && password == self.autofilled_password;
        Credentials {
            host: self.host.clone(),
            username: self.username.value.clone(),
            password,
            ask_save_confirmation: !generated && !autofilled,
            has_user_input: self.has_user_input,
            generated_password: generated,
        }
    }

    /// Credentials worth offering to save, `None` once the current password
    /// has been through save evaluation.
    pub fn unsaved_credentials(&self, allow_empty_username: bool) -> Option<Credentials> {
        let credentials = self.current();
        let password = credentials.password.as_deref().filter(|p| !p.is_empty())?;
        if self.saved_password.as_deref() == Some(password) {
            return None;
        }
        let has_username = credentials.username.as_deref().is_some_and(|u| !u.is_empty());
        if !has_username && !allow_empty_username {
            return None;
        }
        Some(credentials)
    }

    pub fn mark_saved(&mut self) {
        self.saved_password = self.password.value.clone();
    }

    /// A username typed on an earlier step of a multi-step sign-in, offered
    /// in the menu before any password exists.
    pub fn suggested_entry(&self) -> Option<PasswordEntry> {
        if self.password.value.is_some() {
            return None;
        }
        let host = self.host.clone()?;
        let username = self.username.value.clone()?;
        Some(PasswordEntry::new(host, username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_value_does_not_override_user_input() {
        let mut builder = CredentialsBuilder::new();
        builder.enter_page("https://a.com/login");
        builder.update_values(Some("typed"), None, true);
        builder.update_values(Some("script"), None, false);
        assert_eq!(builder.current().username.as_deref(), Some("typed"));
        builder.update_values(Some("retyped"), None, true);
        assert_eq!(builder.current().username.as_deref(), Some("retyped"));
    }

    #[test]
    fn generated_password_saves_without_confirmation() {
        let mut builder = CredentialsBuilder::new();
        builder.enter_page("https://a.com/");
        builder.update_values(Some("bob"), None, true);
        builder.store_generated_password("G3n!");
        let credentials = builder.unsaved_credentials(false).unwrap();
        assert!(credentials.generated_password);
        assert!(!credentials.ask_save_confirmation);
    }

    #[test]
    fn username_alone_becomes_a_suggestion() {
        let mut builder = CredentialsBuilder::new();
        builder.enter_page("https://example.com/login");
        builder.update_values(Some("bob"), None, true);
        assert_eq!(
            builder.suggested_entry(),
            Some(PasswordEntry::new("example.com", "bob"))
        );
        builder.update_values(None, Some("pw"), true);
        assert_eq!(builder.suggested_entry(), None);
    }

    #[test]
    fn enter_page_resets_state() {
        let mut builder = CredentialsBuilder::new();
        builder.enter_page("https://a.com/");
        builder.update_values(Some("bob"), Some("pw"), true);
        builder.enter_page("https://www.b.com/");
        assert_eq!(builder.host(), Some("b.com"));
        assert!(builder.unsaved_credentials(true).is_none());
        assert!(!builder.has_user_input());
    }
}
