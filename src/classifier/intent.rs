use std::collections::HashSet;

use crate::protocol::field_model::{AutofillAction, FieldRole, WebInputField};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentSignal {
    NewPasswordField(String),
    CurrentPasswordField(String),
    TaggedUsername(String),
    PersonalField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIntent {
    pub action: AutofillAction,
    pub signals: Vec<IntentSignal>,
}

/// Action of the single non-payment group of a frame, or `None` when the
/// fields do not add up to anything worth filling.
///
/// `tagged_usernames` holds ids carrying `autocomplete=username`: such a
/// field alone is the first step of a multi-step sign-in.
pub fn infer_group_intent(fields: &[WebInputField], tagged_usernames: &HashSet<String>) -> Option<GroupIntent> {
    let mut signals = Vec::new();

    for field in fields {
        match field.role {
            FieldRole::NewPassword => signals.push(IntentSignal::NewPasswordField(field.id.clone())),
            FieldRole::CurrentPassword => {
                signals.push(IntentSignal::CurrentPasswordField(field.id.clone()))
            }
            FieldRole::CurrentUsername | FieldRole::NewUsername
                if tagged_usernames.contains(&field.id) =>
            {
                signals.push(IntentSignal::TaggedUsername(field.id.clone()))
            }
            FieldRole::Email => signals.push(IntentSignal::PersonalField(field.id.clone())),
            _ => {}
        }
    }

    let has = |pred: fn(&IntentSignal) -> bool| signals.iter().any(pred);

    let action = if has(|s| matches!(s, IntentSignal::NewPasswordField(_))) {
        AutofillAction::CreateAccount
    } else if has(|s| matches!(s, IntentSignal::CurrentPasswordField(_)))
        || has(|s| matches!(s, IntentSignal::TaggedUsername(_)))
    {
        AutofillAction::Login
    } else if !signals.is_empty()
        && fields.iter().all(|f| f.role == FieldRole::Email)
    {
        AutofillAction::PersonalInfo
    } else {
        return None;
    };

    Some(GroupIntent { action, signals })
}
