use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::LOG_INTERNAL;
use crate::classifier::intent::infer_group_intent;
use crate::classifier::rules::{ClassifierRules, HostRule, rules_for_host};
use crate::protocol::field_model::{
    AutocompleteToken, AutofillAction, AutofillGroup, FieldRole, FieldSnapshot, FieldType,
    WebInputField, dedup_snapshots,
};
use crate::protocol::messages::FrameRef;

const INPUT_MODES: [&str; 4] = ["text", "tel", "email", "numeric"];
const CONFIRMATION_HINTS: [&str; 5] = ["confirm", "repeat", "retype", "verif", "again"];
const NEW_PASSWORD_HINTS: [&str; 2] = ["new", "create"];
const CURRENT_PASSWORD_HINTS: [&str; 2] = ["current", "old"];
const USERNAME_HINTS: [&str; 4] = ["user", "login", "account", "identifier"];
const NOT_USERNAME_HINTS: [&str; 6] = ["first", "last", "search", "zip", "postal", "captcha"];

/// Minimum evidence for a plain field to be taken as the username.
const USERNAME_THRESHOLD: i32 = 10;

/// Roles and groups of one frame's fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub roles: HashMap<String, FieldRole>,
    pub groups: Vec<AutofillGroup>,
}

impl Classification {
    pub fn role(&self, id: &str) -> Option<FieldRole> {
        self.roles.get(id).copied()
    }

    pub fn group_for(&self, id: &str) -> Option<&AutofillGroup> {
        self.groups.iter().find(|g| g.field(id).is_some())
    }
}

pub fn classify_fields(fields: &[FieldSnapshot], rules: &ClassifierRules) -> Classification {
    let page_has_password = fields.iter().any(|f| f.is_password());
    let page_has_non_password = fields.iter().any(|f| !f.is_password());
    let discard_autocomplete = rules.discards_autocomplete(page_has_password);

    let token_of = |field: &FieldSnapshot| -> Option<AutocompleteToken> {
        if discard_autocomplete {
            None
        } else {
            field.decoded_autocomplete()
        }
    };

    let mut roles: HashMap<String, FieldRole> = fields
        .iter()
        .map(|f| (f.beam_id.clone(), FieldRole::Other))
        .collect();

    let eligible: Vec<&FieldSnapshot> = fields
        .iter()
        .filter(|f| input_mode_supported(f))
        .filter(|f| rules.allow_field(f, page_has_password))
        .filter(|f| !rules.drops_lone_password(f, page_has_non_password))
        .collect();

    // Payment
    let mut payment_ids = Vec::new();
    for field in &eligible {
        if field.is_password() {
            continue;
        }
        if let Some(role) = payment_role(field, token_of(field).as_ref()) {
            roles.insert(field.beam_id.clone(), role);
            payment_ids.push(field.beam_id.clone());
        }
    }

    // Passwords. Fields tagged current/new-password count even when the
    // page toggled them to type=text to reveal the value.
    let passwords: Vec<(usize, &FieldSnapshot)> = eligible
        .iter()
        .enumerate()
        .filter(|(_, f)| !payment_ids.contains(&f.beam_id))
        .filter(|(_, f)| match token_of(f) {
            Some(AutocompleteToken::CurrentPassword | AutocompleteToken::NewPassword) => true,
            token => f.is_password() && password_compatible(token.as_ref()),
        })
        .map(|(i, f)| (i, *f))
        .collect();

    // Two fields, one of them named as a confirmation: a new password typed
    // twice, whatever current/old words say. With a third field those words
    // pick the current one.
    let confirmation = has_confirmation_pair(&passwords);
    let confirmation_only = passwords.len() == 2
        && passwords
            .iter()
            .any(|(_, p)| p.hints_contain(&CONFIRMATION_HINTS));
    for (_, field) in &passwords {
        let role = match token_of(field) {
            Some(AutocompleteToken::NewPassword) => FieldRole::NewPassword,
            Some(AutocompleteToken::CurrentPassword) => FieldRole::CurrentPassword,
            _ if confirmation_only => FieldRole::NewPassword,
            _ if field.hints_contain_word(&CURRENT_PASSWORD_HINTS) => FieldRole::CurrentPassword,
            _ if confirmation || field.hints_contain_word(&NEW_PASSWORD_HINTS) => {
                FieldRole::NewPassword
            }
            _ => FieldRole::CurrentPassword,
        };
        roles.insert(field.beam_id.clone(), role);
    }

    // Usernames
    let password_positions: HashSet<usize> = passwords.iter().map(|(i, _)| *i).collect();
    let has_new_password = roles.values().any(|r| *r == FieldRole::NewPassword);
    let mut tagged_usernames = HashSet::new();

    let candidates: Vec<(&FieldSnapshot, i32)> = eligible
        .iter()
        .enumerate()
        .filter(|(i, f)| !password_positions.contains(i) && !payment_ids.contains(&f.beam_id))
        .filter_map(|(i, f)| {
            let precedes_password = password_positions.contains(&(i + 1));
            username_score(f, token_of(f).as_ref(), precedes_password).map(|s| (*f, s))
        })
        .collect();

    let mut username_id = None;
    if !passwords.is_empty() {
        // First best candidate wins ties.
        let best = candidates
            .iter()
            .filter(|(_, score)| *score >= USERNAME_THRESHOLD)
            .fold(None::<(&FieldSnapshot, i32)>, |best, &(f, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((f, s)),
            });
        if let Some((field, _)) = best {
            let role = if has_new_password {
                FieldRole::NewUsername
            } else {
                FieldRole::CurrentUsername
            };
            roles.insert(field.beam_id.clone(), role);
            username_id = Some(field.beam_id.clone());
        }
    } else if let Some((field, _)) = candidates
        .iter()
        .find(|(f, _)| token_of(f) == Some(AutocompleteToken::Username))
    {
        roles.insert(field.beam_id.clone(), FieldRole::CurrentUsername);
        username_id = Some(field.beam_id.clone());
    }

    if let Some(id) = &username_id {
        if let Some(field) = eligible.iter().find(|f| &f.beam_id == id) {
            if token_of(field) == Some(AutocompleteToken::Username) {
                tagged_usernames.insert(id.clone());
            }
        }
    }

    for (field, _) in &candidates {
        if Some(&field.beam_id) == username_id.as_ref() {
            continue;
        }
        if field.field_type == FieldType::Email || token_of(field) == Some(AutocompleteToken::Email) {
            roles.insert(field.beam_id.clone(), FieldRole::Email);
        }
    }

    // Groups
    let mut groups = Vec::new();

    let grouped: Vec<WebInputField> = eligible
        .iter()
        .filter_map(|f| {
            let role = roles.get(&f.beam_id).copied()?;
            (role != FieldRole::Other && !role.is_payment())
                .then(|| WebInputField::new(f.beam_id.clone(), role))
        })
        .collect();

    if let Some(intent) = infer_group_intent(&grouped, &tagged_usernames) {
        let is_ambiguous = intent.action == AutofillAction::Login
            && passwords.len() == 1
            && !passwords.iter().any(|(_, p)| {
                token_of(p).is_some_and(|t| {
                    matches!(t, AutocompleteToken::CurrentPassword | AutocompleteToken::NewPassword)
                }) || p.hints_contain_word(&CURRENT_PASSWORD_HINTS)
                    || p.hints_contain_word(&NEW_PASSWORD_HINTS)
                    || p.hints_contain(&CONFIRMATION_HINTS)
            })
            && tagged_usernames.is_empty();

        groups.push(AutofillGroup {
            action: intent.action,
            fields: grouped,
            is_ambiguous,
        });
    }

    if !payment_ids.is_empty() {
        groups.push(AutofillGroup {
            action: AutofillAction::Payment,
            fields: payment_ids
                .iter()
                .filter_map(|id| roles.get(id).map(|r| WebInputField::new(id.clone(), *r)))
                .collect(),
            is_ambiguous: false,
        });
    }

    Classification { roles, groups }
}

fn input_mode_supported(field: &FieldSnapshot) -> bool {
    match field.input_mode.as_deref() {
        None => true,
        Some(mode) => INPUT_MODES.contains(&mode.trim().to_lowercase().as_str()),
    }
}

fn password_compatible(token: Option<&AutocompleteToken>) -> bool {
    matches!(
        token,
        None | Some(
            AutocompleteToken::CurrentPassword
                | AutocompleteToken::NewPassword
                | AutocompleteToken::Off
                | AutocompleteToken::On
        )
    )
}

/// Two password fields where one is explicitly a confirmation, or two
/// adjacent password fields that look alike.
fn has_confirmation_pair(passwords: &[(usize, &FieldSnapshot)]) -> bool {
    if passwords.len() < 2 {
        return false;
    }
    passwords
        .iter()
        .any(|(_, p)| p.hints_contain(&CONFIRMATION_HINTS))
        || passwords.windows(2).any(|pair| {
            let (i, a) = pair[0];
            let (j, b) = pair[1];
            j == i + 1 && a.autocomplete == b.autocomplete && a.element_class == b.element_class
        })
}

fn payment_role(field: &FieldSnapshot, token: Option<&AutocompleteToken>) -> Option<FieldRole> {
    match token {
        Some(AutocompleteToken::CardNumber) => return Some(FieldRole::CardNumber),
        Some(AutocompleteToken::CardHolder | AutocompleteToken::CardFamilyName) => {
            return Some(FieldRole::CardHolder);
        }
        Some(AutocompleteToken::CardExpiration) => return Some(FieldRole::CardExpirationDate),
        Some(AutocompleteToken::CardExpirationMonth) => return Some(FieldRole::CardExpirationMonth),
        Some(AutocompleteToken::CardExpirationYear) => return Some(FieldRole::CardExpirationYear),
        None | Some(AutocompleteToken::On | AutocompleteToken::Off) => {}
        Some(_) => return None,
    }

    let hints: Vec<String> = field
        .hints()
        .iter()
        .map(|h| h.replace(['-', '_', ' '], ""))
        .collect();
    let any = |needles: &[&str]| hints.iter().any(|h| needles.iter().any(|n| h.contains(n)));

    if any(&["cardnumber", "ccnumber", "ccnum"]) {
        Some(FieldRole::CardNumber)
    } else if any(&["cardholder", "ccname", "nameoncard"]) {
        Some(FieldRole::CardHolder)
    } else if any(&["expmonth", "expirymonth", "expirationmonth", "ccmonth"]) {
        Some(FieldRole::CardExpirationMonth)
    } else if any(&["expyear", "expiryyear", "expirationyear", "ccyear"]) {
        Some(FieldRole::CardExpirationYear)
    } else if any(&["ccexp", "expdate", "expirydate", "expirationdate", "cardexpiry"]) {
        Some(FieldRole::CardExpirationDate)
    } else {
        None
    }
}

fn username_score(field: &FieldSnapshot, token: Option<&AutocompleteToken>, precedes_password: bool) -> Option<i32> {
    if field.is_password() {
        return None;
    }
    let mut score = match token {
        Some(AutocompleteToken::Username) => 500,
        Some(AutocompleteToken::Email) => 100,
        Some(AutocompleteToken::Tel) => 50,
        Some(AutocompleteToken::On) => 20,
        None => 0,
        Some(AutocompleteToken::Off) => -10,
        Some(_) => return None,
    };
    if field.field_type == FieldType::Email {
        score += 100;
    }
    if field.hints_contain(&USERNAME_HINTS) {
        score += 10;
    } else if field.hints_contain(&["mail"]) {
        score += 5;
    }
    if field.hints_contain(&NOT_USERNAME_HINTS) {
        score -= 20;
    }
    if precedes_password {
        score += 30;
    }
    Some(score)
}

fn snapshot_fingerprint(fields: &[FieldSnapshot]) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    for field in fields {
        hasher.update(format!("{:?}", field).as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
struct FrameTable {
    fields: Vec<FieldSnapshot>,
    fingerprint: Option<String>,
    classification: Classification,
}

/// Accumulated classification of every frame of the current page.
#[derive(Debug, Default)]
pub struct FieldClassifier {
    host_rules: Vec<HostRule>,
    frames: HashMap<FrameRef, FrameTable>,
}

impl FieldClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_rules(host_rules: Vec<HostRule>) -> Self {
        FieldClassifier {
            host_rules,
            frames: HashMap::new(),
        }
    }

    /// Merge a snapshot into the frame's table and reclassify it.
    ///
    /// Returns ids the frame had never reported before. Fields missing from
    /// the snapshot stay tracked until [`FieldClassifier::clear`], so forms
    /// that grow lazily keep their earlier fields.
    pub fn classify(&mut self, fields: &[FieldSnapshot], host: Option<&str>, frame: &FrameRef) -> Vec<String> {
        let rules = rules_for_host(host, &self.host_rules);
        let incoming = dedup_snapshots(fields);
        let fingerprint = snapshot_fingerprint(&incoming);

        let table = self.frames.entry(frame.clone()).or_default();
        if table.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            debug!(target: LOG_INTERNAL, frame = %frame, "snapshot unchanged, keeping classification");
            return Vec::new();
        }
        table.fingerprint = Some(fingerprint);

        let mut newly_seen = Vec::new();
        for field in incoming {
            match table.fields.iter_mut().find(|f| f.beam_id == field.beam_id) {
                Some(existing) => *existing = field,
                None => {
                    newly_seen.push(field.beam_id.clone());
                    table.fields.push(field);
                }
            }
        }

        table.classification = classify_fields(&table.fields, &rules);
        debug!(
            target: LOG_INTERNAL,
            frame = %frame,
            fields = table.fields.len(),
            groups = table.classification.groups.len(),
            new = newly_seen.len(),
            "classified fields"
        );
        newly_seen
    }

    pub fn autofill_group(&self, id: &str, frame: &FrameRef) -> Option<&AutofillGroup> {
        self.frames.get(frame)?.classification.group_for(id)
    }

    pub fn groups(&self, frame: &FrameRef) -> &[AutofillGroup] {
        self.frames
            .get(frame)
            .map(|t| t.classification.groups.as_slice())
            .unwrap_or(&[])
    }

    pub fn field_role(&self, id: &str, frame: &FrameRef) -> Option<FieldRole> {
        self.frames.get(frame)?.classification.role(id)
    }

    pub fn field(&self, id: &str, frame: &FrameRef) -> Option<&FieldSnapshot> {
        self.frames.get(frame)?.fields.iter().find(|f| f.beam_id == id)
    }

    pub fn knows(&self, id: &str, frame: &FrameRef) -> bool {
        self.field(id, frame).is_some()
    }

    /// Fields that belong to a group, in group order.
    pub fn all_input_fields(&self, frame: &FrameRef) -> Vec<WebInputField> {
        let mut seen = HashSet::new();
        self.groups(frame)
            .iter()
            .flat_map(|g| g.fields.iter())
            .filter(|f| seen.insert(f.id.clone()))
            .cloned()
            .collect()
    }

    /// Every id the frame ever reported, grouped or not.
    pub fn all_input_field_ids(&self, frame: &FrameRef) -> Vec<String> {
        self.frames
            .get(frame)
            .map(|t| t.fields.iter().map(|f| f.beam_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameRef> {
        self.frames.keys()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
