use serde::{Deserialize, Serialize};

use crate::protocol::field_model::{AutocompleteToken, FieldSnapshot, FieldType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Never,
    Always,
    WhenPasswordField,
}

impl Condition {
    fn holds(&self, page_contains_password_field: bool) -> bool {
        match self {
            Condition::Never => false,
            Condition::Always => true,
            Condition::WhenPasswordField => page_contains_password_field,
        }
    }
}

/// Per-host tweaks for sites whose markup misleads the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Classify text fields despite `autocomplete=off`.
    pub ignore_text_autocomplete_off: Condition,
    pub ignore_email_autocomplete_off: Condition,
    pub ignore_password_autocomplete_off: Condition,
    /// Classify as if no field had an autocomplete attribute.
    pub discard_autocomplete_attribute: Condition,
    /// A page holding nothing but one untagged password field is not a form.
    pub ignore_untagged_password_field_alone: bool,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        ClassifierRules {
            ignore_text_autocomplete_off: Condition::WhenPasswordField,
            ignore_email_autocomplete_off: Condition::WhenPasswordField,
            ignore_password_autocomplete_off: Condition::Always,
            discard_autocomplete_attribute: Condition::Never,
            ignore_untagged_password_field_alone: false,
        }
    }
}

impl ClassifierRules {
    pub fn allow_field(&self, field: &FieldSnapshot, page_contains_password_field: bool) -> bool {
        if field.decoded_autocomplete() != Some(AutocompleteToken::Off) {
            return true;
        }
        let condition = match field.field_type {
            FieldType::Password => self.ignore_password_autocomplete_off,
            FieldType::Email => self.ignore_email_autocomplete_off,
            FieldType::Text | FieldType::Unknown => self.ignore_text_autocomplete_off,
        };
        condition.holds(page_contains_password_field)
    }

    pub fn discards_autocomplete(&self, page_contains_password_field: bool) -> bool {
        self.discard_autocomplete_attribute
            .holds(page_contains_password_field)
    }

    pub fn drops_lone_password(&self, field: &FieldSnapshot, page_contains_non_password_field: bool) -> bool {
        self.ignore_untagged_password_field_alone
            && field.is_password()
            && field.autocomplete.is_none()
            && !page_contains_non_password_field
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRule {
    pub host: String,
    #[serde(default)]
    pub rules: ClassifierRules,
}

/// Hosts known to tag their login fields with misleading autocomplete values.
fn builtin_rules(host: &str) -> Option<ClassifierRules> {
    match host {
        "pinterest.com" | "netflix.com" => Some(ClassifierRules {
            discard_autocomplete_attribute: Condition::WhenPasswordField,
            ..ClassifierRules::default()
        }),
        _ => None,
    }
}

/// Configured rules win over the built-in table.
pub fn rules_for_host(host: Option<&str>, overrides: &[HostRule]) -> ClassifierRules {
    let Some(host) = host else {
        return ClassifierRules::default();
    };
    overrides
        .iter()
        .find(|r| r.host.eq_ignore_ascii_case(host))
        .map(|r| r.rules)
        .or_else(|| builtin_rules(host))
        .unwrap_or_default()
}
