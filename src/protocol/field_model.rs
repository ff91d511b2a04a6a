use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

/// One input element as reported by the page script.
///
/// `beam_id` is assigned once per element by the script (the DOM id when
/// present, else a page-scoped counter) and is the only handle ever used to
/// address the field afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    pub beam_id: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
    #[serde(default, deserialize_with = "attribute_flag")]
    pub autofocus: bool,
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub element_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "attribute_flag")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "inputmode", alias = "inputMode", default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
}

impl FieldSnapshot {
    pub fn new(beam_id: impl Into<String>, field_type: FieldType) -> Self {
        FieldSnapshot {
            beam_id: beam_id.into(),
            field_type,
            autocomplete: None,
            autofocus: false,
            element_class: None,
            name: None,
            required: false,
            value: None,
            input_mode: None,
        }
    }

    pub fn with_autocomplete(mut self, autocomplete: &str) -> Self {
        self.autocomplete = Some(autocomplete.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.element_class = Some(class.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_input_mode(mut self, input_mode: &str) -> Self {
        self.input_mode = Some(input_mode.to_string());
        self
    }

    pub fn is_password(&self) -> bool {
        self.field_type == FieldType::Password
    }

    /// Decoded autocomplete token, `None` when the attribute is absent.
    pub fn decoded_autocomplete(&self) -> Option<AutocompleteToken> {
        self.autocomplete.as_deref().map(AutocompleteToken::decode)
    }

    /// Lowercased `name` and `class` attributes, the inputs of name heuristics.
    pub fn hints(&self) -> Vec<String> {
        [self.element_class.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(|s| s.to_lowercase())
            .collect()
    }

    pub fn hints_contain(&self, needles: &[&str]) -> bool {
        self.hints()
            .iter()
            .any(|hint| needles.iter().any(|n| hint.contains(n)))
    }

    /// Lowercased words of `name` and `class`, split on punctuation and
    /// camelCase boundaries: `oldPassword input-bold` gives
    /// `old password input bold`.
    pub fn hint_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        for attribute in [self.element_class.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
        {
            let mut word = String::new();
            let mut prev_lower = false;
            for c in attribute.chars() {
                if !c.is_alphanumeric() {
                    if !word.is_empty() {
                        words.push(std::mem::take(&mut word));
                    }
                    prev_lower = false;
                    continue;
                }
                if c.is_uppercase() && prev_lower && !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
                prev_lower = c.is_lowercase() || c.is_numeric();
                word.extend(c.to_lowercase());
            }
            if !word.is_empty() {
                words.push(word);
            }
        }
        words
    }

    pub fn hints_contain_word(&self, words: &[&str]) -> bool {
        self.hint_words().iter().any(|w| words.contains(&w.as_str()))
    }
}

/// Boolean HTML attributes arrive either as JSON booleans or as the raw
/// attribute string (`""` when present).
fn attribute_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => !s.eq_ignore_ascii_case("false"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Password,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AutocompleteToken {
    Off,
    On,
    Username,
    CurrentPassword,
    NewPassword,
    Email,
    Tel,
    CardHolder,
    CardFamilyName,
    CardNumber,
    CardExpiration,
    CardExpirationMonth,
    CardExpirationYear,
    Other(String),
}

impl AutocompleteToken {
    /// Decode the last whitespace-separated token of an autocomplete attribute
    /// (`"section-a shipping email"` decodes as `email`).
    pub fn decode(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        let token = lower.split_whitespace().last().unwrap_or("");
        match token {
            "off" => AutocompleteToken::Off,
            "on" => AutocompleteToken::On,
            "username" => AutocompleteToken::Username,
            "current-password" => AutocompleteToken::CurrentPassword,
            "new-password" => AutocompleteToken::NewPassword,
            "email" => AutocompleteToken::Email,
            "tel" => AutocompleteToken::Tel,
            "cc-name" | "cc-given-name" => AutocompleteToken::CardHolder,
            "cc-family-name" => AutocompleteToken::CardFamilyName,
            "cc-number" => AutocompleteToken::CardNumber,
            "cc-exp" => AutocompleteToken::CardExpiration,
            "cc-exp-month" => AutocompleteToken::CardExpirationMonth,
            "cc-exp-year" => AutocompleteToken::CardExpirationYear,
            other => AutocompleteToken::Other(other.to_string()),
        }
    }

    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            AutocompleteToken::CardHolder
                | AutocompleteToken::CardFamilyName
                | AutocompleteToken::CardNumber
                | AutocompleteToken::CardExpiration
                | AutocompleteToken::CardExpirationMonth
                | AutocompleteToken::CardExpirationYear
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRole {
    CurrentUsername,
    NewUsername,
    CurrentPassword,
    NewPassword,
    Email,
    CardNumber,
    CardHolder,
    CardExpirationDate,
    CardExpirationMonth,
    CardExpirationYear,
    Other,
}

impl FieldRole {
    pub fn is_password(&self) -> bool {
        matches!(self, FieldRole::CurrentPassword | FieldRole::NewPassword)
    }

    pub fn is_username(&self) -> bool {
        matches!(self, FieldRole::CurrentUsername | FieldRole::NewUsername)
    }

    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            FieldRole::CardNumber
                | FieldRole::CardHolder
                | FieldRole::CardExpirationDate
                | FieldRole::CardExpirationMonth
                | FieldRole::CardExpirationYear
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutofillAction {
    Login,
    CreateAccount,
    Payment,
    PersonalInfo,
}

impl AutofillAction {
    pub fn is_password_related(&self) -> bool {
        matches!(self, AutofillAction::Login | AutofillAction::CreateAccount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebInputField {
    pub id: String,
    pub role: FieldRole,
}

impl WebInputField {
    pub fn new(id: impl Into<String>, role: FieldRole) -> Self {
        WebInputField {
            id: id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofillGroup {
    pub action: AutofillAction,
    pub fields: Vec<WebInputField>,
    /// Sign-in vs. account creation cannot be told apart structurally.
    pub is_ambiguous: bool,
}

impl AutofillGroup {
    pub fn field(&self, id: &str) -> Option<&WebInputField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn ids_with_role(&self, predicate: impl Fn(FieldRole) -> bool) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| predicate(f.role))
            .map(|f| f.id.clone())
            .collect()
    }

    pub fn password_ids(&self) -> Vec<String> {
        self.ids_with_role(|r| r.is_password())
    }
}

/// Drop structurally identical snapshots, keeping first occurrence order.
pub fn dedup_snapshots(fields: &[FieldSnapshot]) -> Vec<FieldSnapshot> {
    let mut seen = HashSet::new();
    fields
        .iter()
        .filter(|f| seen.insert((*f).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_last_autocomplete_token() {
        assert_eq!(
            AutocompleteToken::decode("section-a shipping email"),
            AutocompleteToken::Email
        );
        assert_eq!(
            AutocompleteToken::decode(" Current-Password "),
            AutocompleteToken::CurrentPassword
        );
        assert_eq!(
            AutocompleteToken::decode("nickname"),
            AutocompleteToken::Other("nickname".into())
        );
        assert!(AutocompleteToken::decode("cc-exp-month").is_payment());
    }

    #[test]
    fn snapshot_accepts_string_and_bool_attribute_flags() {
        let json = r#"[
            {"beamId":"a","type":"text","required":"","autofocus":false},
            {"beamId":"b","type":"password","required":true},
            {"beamId":"c","type":"tel"}
        ]"#;
        let fields: Vec<FieldSnapshot> = serde_json::from_str(json).unwrap();
        assert!(fields[0].required);
        assert!(!fields[0].autofocus);
        assert!(fields[1].required);
        assert_eq!(fields[2].field_type, FieldType::Unknown);
        assert!(!fields[2].required);
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = FieldSnapshot::new("a", FieldType::Text);
        let b = FieldSnapshot::new("b", FieldType::Password);
        let deduped = dedup_snapshots(&[a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }

    #[test]
    fn hint_words_split_on_punctuation_and_case() {
        let field = FieldSnapshot::new("p", FieldType::Password)
            .with_class("input placeholder-shown")
            .with_name("oldPassword_2");
        assert_eq!(
            field.hint_words(),
            vec!["input", "placeholder", "shown", "old", "password", "2"]
        );
        assert!(field.hints_contain_word(&["old"]));
        assert!(!FieldSnapshot::new("q", FieldType::Password)
            .with_class("bold golden")
            .hints_contain_word(&["old"]));
    }
}
