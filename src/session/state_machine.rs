use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::LOG_INTERNAL;
use crate::builder::credentials::CredentialsBuilder;
use crate::builder::credit_card::CreditCardBuilder;
use crate::builder::host::minimized_host;
use crate::classifier::classifier::FieldClassifier;
use crate::cli::config::{AutofillConfig, Feature, FeatureConfig, TimingConfig};
use crate::frames::locator::FieldLocator;
use crate::frames::web_frames::WebFrames;
use crate::protocol::field_model::{AutofillAction, AutofillGroup, FieldRole, FieldSnapshot};
use crate::protocol::messages::{BridgeMessage, FrameInfo, FrameRef};
use crate::session::menu::MenuOptions;

/// Everything the page can tell the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    PageLoad { url: String },
    FrameLoaded { frame: FrameRef },
    FieldsUpdated { fields: Vec<FieldSnapshot>, frame: FrameRef },
    FocusIn { id: String, frame: FrameRef, text: Option<String> },
    FocusOut { id: String, frame: FrameRef },
    Submit { id: String, frame: FrameRef },
    Resize { width: f64, height: f64 },
    FrameBounds { frames: Vec<FrameInfo> },
    FrameScroll { href: String, scroll_x: f64, scroll_y: f64 },
}

impl Observation {
    /// Messages without a frame come from the main frame.
    pub fn from_message(message: BridgeMessage, main_frame: Option<&FrameRef>) -> Observation {
        let resolve = |frame: Option<FrameRef>| {
            frame
                .or_else(|| main_frame.cloned())
                .unwrap_or_else(|| FrameRef::new(""))
        };
        match message {
            BridgeMessage::Loaded { url, frame: None } => Observation::PageLoad { url },
            BridgeMessage::Loaded { frame: Some(frame), .. } => Observation::FrameLoaded { frame },
            BridgeMessage::TextInputFields { fields, frame } => Observation::FieldsUpdated {
                fields,
                frame: resolve(frame),
            },
            BridgeMessage::TextInputFocusIn { id, text, frame } => Observation::FocusIn {
                id,
                frame: resolve(frame),
                text,
            },
            BridgeMessage::TextInputFocusOut { id, frame } => Observation::FocusOut {
                id,
                frame: resolve(frame),
            },
            BridgeMessage::FormSubmit { id, frame } => Observation::Submit {
                id,
                frame: resolve(frame),
            },
            BridgeMessage::Resize { width, height } => Observation::Resize { width, height },
            BridgeMessage::FrameBounds { frames } => Observation::FrameBounds { frames },
            BridgeMessage::FrameScroll {
                href,
                scroll_x,
                scroll_y,
            } => Observation::FrameScroll {
                href,
                scroll_x,
                scroll_y,
            },
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::PageLoad { url } => write!(f, "pageLoad({})", url),
            Observation::FrameLoaded { frame } => write!(f, "frameLoaded({})", frame),
            Observation::FieldsUpdated { fields, frame } => {
                write!(f, "fieldsUpdated({}, {} fields)", frame, fields.len())
            }
            Observation::FocusIn { id, .. } => write!(f, "focusIn({})", id),
            Observation::FocusOut { id, .. } => write!(f, "focusOut({})", id),
            Observation::Submit { id, .. } => write!(f, "submit({})", id),
            Observation::Resize { width, height } => write!(f, "resize({}x{})", width, height),
            Observation::FrameBounds { frames } => write!(f, "frameBounds({})", frames.len()),
            Observation::FrameScroll { href, .. } => write!(f, "frameScroll({})", href),
        }
    }
}

/// Work the controller performs after a transition, in order.
#[derive(Debug, Clone)]
pub enum Effect {
    RequestFields {
        frame: FrameRef,
        frame_identifier: u32,
    },
    InstallHandlers {
        frame: FrameRef,
        ids: Vec<String>,
        submit_handler: bool,
    },
    QueryFocusedField {
        frame: FrameRef,
    },
    Teardown {
        element_id: String,
    },
    /// Read every tracked field of the frame and feed the builders.
    CaptureValues {
        frame: FrameRef,
        fallback_to_last: bool,
    },
    SaveCreditCard,
    SaveCredentials {
        allow_empty_username: bool,
    },
    FinishSubmit,
    Setup {
        element_id: String,
        frame: FrameRef,
        group: AutofillGroup,
        locator: Arc<FieldLocator>,
    },
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::RequestFields {
                frame_identifier, ..
            } => write!(f, "requestFields({})", frame_identifier),
            Effect::InstallHandlers {
                ids, submit_handler, ..
            } => write!(f, "installHandlers({}, submit={})", ids.join(","), submit_handler),
            Effect::QueryFocusedField { .. } => f.write_str("queryFocusedField"),
            Effect::Teardown { element_id } => write!(f, "teardown({})", element_id),
            Effect::CaptureValues { .. } => f.write_str("captureValues"),
            Effect::SaveCreditCard => f.write_str("saveCreditCard"),
            Effect::SaveCredentials {
                allow_empty_username,
            } => write!(f, "saveCredentials(allowEmptyUsername={})", allow_empty_username),
            Effect::FinishSubmit => f.write_str("finishSubmit"),
            Effect::Setup { element_id, .. } => write!(f, "setup({})", element_id),
        }
    }
}

/// Why a focus-in produced no UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    SameField,
    Debounced,
    SubmitGrace,
    FeatureDisabled,
    UnknownField,
    NoMenu,
    NotFocused,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Suppression::SameField => "sameField",
            Suppression::Debounced => "debounced",
            Suppression::SubmitGrace => "submitGrace",
            Suppression::FeatureDisabled => "featureDisabled",
            Suppression::UnknownField => "unknownField",
            Suppression::NoMenu => "noMenu",
            Suppression::NotFocused => "notFocused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub effects: Vec<Effect>,
    pub suppressed: Option<Suppression>,
}

impl Reconciliation {
    fn suppress(mut self, reason: Suppression) -> Self {
        self.suppressed = Some(reason);
        self
    }

    fn merge(&mut self, other: Reconciliation) {
        self.effects.extend(other.effects);
        if other.suppressed.is_some() {
            self.suppressed = other.suppressed;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FocusedField {
    pub element_id: String,
    pub frame: FrameRef,
    pub group: AutofillGroup,
    pub locator: Arc<FieldLocator>,
    pub password_visible: bool,
}

#[derive(Debug, Clone, Default)]
pub enum FocusState {
    #[default]
    Idle,
    Focused(FocusedField),
    SubmitInFlight,
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusState::Idle => f.write_str("idle"),
            FocusState::Focused(field) => write!(f, "focused({})", field.element_id),
            FocusState::SubmitInFlight => f.write_str("submitInFlight"),
        }
    }
}

/// All mutable state of one tab's autofill session.
#[derive(Debug)]
pub struct SessionState {
    /// Bumped on every page load; async results from an older epoch are dropped.
    pub epoch: u64,
    pub main_frame: Option<FrameRef>,
    pub host: Option<String>,
    pub focus: FocusState,
    pub previously_focused: Option<(String, FrameRef)>,
    pub last_focus_out: Option<Instant>,
    pub submitted_at: Option<Instant>,
    pub pending_focus: Option<(String, FrameRef)>,
    pub values_on_focus_out: Option<(FrameRef, HashMap<String, String>)>,
    pub classifier: FieldClassifier,
    pub credentials: CredentialsBuilder,
    pub cards: CreditCardBuilder,
    pub frames: WebFrames,
    pub focus_handlers: HashSet<(FrameRef, String)>,
    pub submit_handlers: HashSet<FrameRef>,
    pub frame_counter: u32,
    pub features: FeatureConfig,
    pub timing: TimingConfig,
}

impl SessionState {
    pub fn new(config: &AutofillConfig) -> Self {
        SessionState {
            epoch: 0,
            main_frame: None,
            host: None,
            focus: FocusState::Idle,
            previously_focused: None,
            last_focus_out: None,
            submitted_at: None,
            pending_focus: None,
            values_on_focus_out: None,
            classifier: FieldClassifier::with_host_rules(config.host_rules.clone()),
            credentials: CredentialsBuilder::new(),
            cards: CreditCardBuilder::new(),
            frames: WebFrames::new(),
            focus_handlers: HashSet::new(),
            submit_handlers: HashSet::new(),
            frame_counter: 0,
            features: config.features,
            timing: config.timing,
        }
    }

    pub fn focused(&self) -> Option<&FocusedField> {
        match &self.focus {
            FocusState::Focused(field) => Some(field),
            _ => None,
        }
    }

    pub fn focused_mut(&mut self) -> Option<&mut FocusedField> {
        match &mut self.focus {
            FocusState::Focused(field) => Some(field),
            _ => None,
        }
    }

    pub fn is_enabled(&self, action: AutofillAction) -> bool {
        self.features.is_enabled(Feature::for_action(action))
    }

    pub fn reconcile(&mut self, observation: Observation, now: Instant) -> Reconciliation {
        match observation {
            Observation::PageLoad { url } => self.page_load(url),
            Observation::FrameLoaded { frame } => {
                let mut r = Reconciliation::default();
                self.request_fields(&frame, &mut r);
                r
            }
            Observation::FieldsUpdated { fields, frame } => self.fields_updated(fields, frame, now),
            Observation::FocusIn { id, frame, .. } => self.focus_in(id, frame, now),
            Observation::FocusOut { id, frame } => self.focus_out(id, frame, now),
            Observation::Submit { id, frame } => self.submit(id, frame, now),
            Observation::Resize { .. } => {
                let mut r = Reconciliation::default();
                self.release_focus(Some(now), &mut r);
                r
            }
            Observation::FrameBounds { frames } => {
                self.frames.set_frames(frames);
                Reconciliation::default()
            }
            Observation::FrameScroll {
                href,
                scroll_x,
                scroll_y,
            } => {
                let info = self.frames.set_frame_info_scroll(&href, scroll_x, scroll_y);
                if let Some(field) = self.focused() {
                    field.locator.frame_scrolled(&info);
                }
                Reconciliation::default()
            }
        }
    }

    /// Hand the focused field's UI back, optionally recording it for the
    /// debounce guard.
    pub fn release_focus(&mut self, now: Option<Instant>, r: &mut Reconciliation) -> Option<FocusedField> {
        let FocusState::Focused(field) = std::mem::take(&mut self.focus) else {
            return None;
        };
        r.effects.push(Effect::Teardown {
            element_id: field.element_id.clone(),
        });
        if let Some(now) = now {
            self.previously_focused = Some((field.element_id.clone(), field.frame.clone()));
            self.last_focus_out = Some(now);
        }
        Some(field)
    }

    fn request_fields(&mut self, frame: &FrameRef, r: &mut Reconciliation) {
        if frame.is_blank() {
            return;
        }
        self.frame_counter += 1;
        r.effects.push(Effect::RequestFields {
            frame: frame.clone(),
            frame_identifier: self.frame_counter,
        });
    }

    fn page_load(&mut self, url: String) -> Reconciliation {
        let mut r = Reconciliation::default();
        self.release_focus(None, &mut r);

        self.epoch += 1;
        self.host = minimized_host(&url);
        self.credentials.enter_page(&url);
        self.cards.enter_page();
        self.classifier.clear();
        self.focus_handlers.clear();
        self.submit_handlers.clear();
        self.frame_counter = 0;
        self.frames.reset(&url);
        self.previously_focused = None;
        self.last_focus_out = None;
        self.submitted_at = None;
        self.pending_focus = None;
        self.values_on_focus_out = None;

        let main = FrameRef::new(url);
        self.main_frame = Some(main.clone());
        debug!(target: LOG_INTERNAL, epoch = self.epoch, host = ?self.host, "page load");
        self.request_fields(&main, &mut r);
        r
    }

    fn fields_updated(&mut self, fields: Vec<FieldSnapshot>, frame: FrameRef, now: Instant) -> Reconciliation {
        let mut r = Reconciliation::default();
        let present: HashSet<&str> = fields.iter().map(|f| f.beam_id.as_str()).collect();

        let watched = match self.focused() {
            Some(field) if field.frame == frame => Some(field.element_id.clone()),
            Some(_) => None,
            None => self
                .previously_focused
                .as_ref()
                .filter(|(_, f)| *f == frame)
                .map(|(id, _)| id.clone()),
        };
        if let Some(id) = watched.filter(|id| !present.contains(id.as_str())) {
            // Multi-step forms often replace the step instead of submitting it.
            debug!(target: LOG_INTERNAL, id = %id, "focused field disappeared");
            r.effects.push(Effect::SaveCredentials {
                allow_empty_username: false,
            });
            self.release_focus(Some(now), &mut r);
            self.previously_focused = None;
        }

        let newly_seen = self.classifier.classify(&fields, self.host.as_deref(), &frame);

        let values: HashMap<String, String> = fields
            .iter()
            .filter_map(|f| {
                f.value
                    .as_ref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (f.beam_id.clone(), v.clone()))
            })
            .collect();
        if !values.is_empty() {
            self.record_values(&values, &frame, false);
        }

        let new_ids: Vec<String> = newly_seen
            .into_iter()
            .filter(|id| self.focus_handlers.insert((frame.clone(), id.clone())))
            .collect();
        if !new_ids.is_empty() {
            let submit_handler = self.submit_handlers.insert(frame.clone());
            r.effects.push(Effect::InstallHandlers {
                frame: frame.clone(),
                ids: new_ids,
                submit_handler,
            });
            r.effects.push(Effect::QueryFocusedField {
                frame: frame.clone(),
            });
        }

        if let Some((id, pending_frame)) = self.pending_focus.take() {
            if pending_frame != frame {
                self.pending_focus = Some((id, pending_frame));
            } else if self.classifier.knows(&id, &frame) {
                debug!(target: LOG_INTERNAL, id = %id, "retrying pending focus");
                let retry = self.focus_in(id, frame, now);
                r.merge(retry);
            }
        }
        r
    }

    fn focus_in(&mut self, id: String, frame: FrameRef, now: Instant) -> Reconciliation {
        let mut r = Reconciliation::default();

        if self
            .focused()
            .is_some_and(|f| f.element_id == id && f.frame == frame)
        {
            return r.suppress(Suppression::SameField);
        }

        let refocus = self
            .previously_focused
            .as_ref()
            .is_some_and(|(prev, prev_frame)| *prev == id && *prev_frame == frame);
        if refocus
            && self
                .last_focus_out
                .is_some_and(|t| now.duration_since(t) < self.timing.focus_debounce())
        {
            debug!(target: LOG_INTERNAL, id = %id, "focus in right after focus out on the same field, ignoring");
            return r.suppress(Suppression::Debounced);
        }

        if let Some(previous) = self.release_focus(Some(now), &mut r) {
            r.effects.push(Effect::CaptureValues {
                frame: previous.frame,
                fallback_to_last: false,
            });
        }

        if !self.classifier.knows(&id, &frame) {
            self.pending_focus = Some((id, frame.clone()));
            self.request_fields(&frame, &mut r);
            return r.suppress(Suppression::UnknownField);
        }
        let Some(group) = self.classifier.autofill_group(&id, &frame).cloned() else {
            return r.suppress(Suppression::UnknownField);
        };

        if self
            .submitted_at
            .is_some_and(|t| now.duration_since(t) < self.timing.submit_grace())
        {
            return r.suppress(Suppression::SubmitGrace);
        }
        if !self.is_enabled(group.action) {
            return r.suppress(Suppression::FeatureDisabled);
        }
        if group.action != AutofillAction::Payment && MenuOptions::for_field(&id, true, &group).is_none() {
            return r.suppress(Suppression::NoMenu);
        }

        let locator = Arc::new(FieldLocator::new(id.clone(), &frame, &self.frames));
        self.focus = FocusState::Focused(FocusedField {
            element_id: id.clone(),
            frame: frame.clone(),
            group: group.clone(),
            locator: locator.clone(),
            password_visible: false,
        });
        r.effects.push(Effect::Setup {
            element_id: id,
            frame,
            group,
            locator,
        });
        r
    }

    fn focus_out(&mut self, id: String, frame: FrameRef, now: Instant) -> Reconciliation {
        let mut r = Reconciliation::default();
        let owns_focus = self
            .focused()
            .is_some_and(|f| f.element_id == id && f.frame == frame);
        if owns_focus {
            self.release_focus(Some(now), &mut r);
        } else {
            r.suppressed = Some(Suppression::NotFocused);
        }
        r.effects.push(Effect::CaptureValues {
            frame,
            fallback_to_last: false,
        });
        r
    }

    fn submit(&mut self, id: String, frame: FrameRef, now: Instant) -> Reconciliation {
        let mut r = Reconciliation::default();
        debug!(target: LOG_INTERNAL, id = %id, "submit");
        self.submitted_at = Some(now);
        self.release_focus(Some(now), &mut r);
        self.focus = FocusState::SubmitInFlight;
        r.effects.extend([
            Effect::CaptureValues {
                frame,
                fallback_to_last: true,
            },
            Effect::SaveCreditCard,
            Effect::SaveCredentials {
                allow_empty_username: true,
            },
            Effect::FinishSubmit,
        ]);
        r
    }

    /// Feed field values of `frame` to the builders: card fields to the
    /// card builder, the first non-empty username and password to the
    /// credentials builder.
    pub fn record_values(&mut self, values: &HashMap<String, String>, frame: &FrameRef, user_input: bool) {
        let mut remaining: HashMap<&str, &str> = values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        for (id, value) in values {
            let Some(group) = self.classifier.autofill_group(id, frame) else {
                continue;
            };
            if group.action != AutofillAction::Payment {
                continue;
            }
            if let Some(field) = group.field(id) {
                self.cards.update(value, field.role);
            }
            remaining.remove(id.as_str());
        }

        let fields = self.classifier.all_input_fields(frame);
        let ids_with = |role: FieldRole| -> Vec<&str> {
            fields
                .iter()
                .filter(|f| f.role == role)
                .map(|f| f.id.as_str())
                .collect()
        };
        let new_passwords = ids_with(FieldRole::NewPassword);
        let mut password_ids = new_passwords.clone();
        password_ids.extend(ids_with(FieldRole::CurrentPassword));

        let mut username_ids = if new_passwords.is_empty() {
            Vec::new()
        } else {
            ids_with(FieldRole::NewUsername)
        };
        username_ids.extend(ids_with(FieldRole::CurrentUsername));
        username_ids.extend(ids_with(FieldRole::Email));

        let first = |ids: &[&str]| ids.iter().find_map(|id| remaining.get(id).copied());
        let username = first(&username_ids);
        let password = first(&password_ids);
        self.credentials.update_values(username, password, user_input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::field_model::FieldType;
    use std::time::Duration;

    fn loaded_state(fields: Vec<FieldSnapshot>) -> (SessionState, FrameRef) {
        let mut state = SessionState::new(&AutofillConfig::default());
        let now = Instant::now();
        state.reconcile(
            Observation::PageLoad {
                url: "https://example.com/login".into(),
            },
            now,
        );
        let frame = state.main_frame.clone().unwrap();
        state.reconcile(
            Observation::FieldsUpdated {
                fields,
                frame: frame.clone(),
            },
            now,
        );
        (state, frame)
    }

    fn login_fields() -> Vec<FieldSnapshot> {
        vec![
            FieldSnapshot::new("u", FieldType::Text).with_autocomplete("username"),
            FieldSnapshot::new("p", FieldType::Password),
        ]
    }

    #[test]
    fn page_load_resets_and_requests_fields() {
        let (mut state, _) = loaded_state(login_fields());
        let r = state.reconcile(
            Observation::PageLoad {
                url: "https://other.com/".into(),
            },
            Instant::now(),
        );
        assert_eq!(state.epoch, 2);
        assert_eq!(state.host.as_deref(), Some("other.com"));
        assert!(state.focus_handlers.is_empty());
        assert!(matches!(
            r.effects.as_slice(),
            [Effect::RequestFields { frame_identifier: 1, .. }]
        ));
    }

    #[test]
    fn new_fields_install_handlers_once() {
        let (mut state, frame) = loaded_state(login_fields());
        assert_eq!(state.focus_handlers.len(), 2);
        let mut grown = login_fields();
        grown.push(FieldSnapshot::new("extra", FieldType::Text));
        let r = state.reconcile(Observation::FieldsUpdated { fields: grown, frame }, Instant::now());
        match r.effects.as_slice() {
            [Effect::InstallHandlers { ids, submit_handler, .. }, Effect::QueryFocusedField { .. }] => {
                assert_eq!(ids, &vec!["extra".to_string()]);
                assert!(!submit_handler);
            }
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[test]
    fn focus_on_new_field_tears_down_previous_one() {
        let (mut state, frame) = loaded_state(login_fields());
        let now = Instant::now();
        state.reconcile(
            Observation::FocusIn {
                id: "u".into(),
                frame: frame.clone(),
                text: None,
            },
            now,
        );
        let r = state.reconcile(
            Observation::FocusIn {
                id: "p".into(),
                frame: frame.clone(),
                text: None,
            },
            now + Duration::from_millis(10),
        );
        let labels: Vec<String> = r.effects.iter().map(|e| e.to_string()).collect();
        assert_eq!(labels, vec!["teardown(u)", "captureValues", "setup(p)"]);
        assert_eq!(state.focus.to_string(), "focused(p)");
        assert_eq!(state.previously_focused, Some(("u".to_string(), frame)));
    }

    #[test]
    fn submit_grace_blocks_focus_ui() {
        let (mut state, frame) = loaded_state(login_fields());
        let now = Instant::now();
        state.reconcile(
            Observation::Submit {
                id: "p".into(),
                frame: frame.clone(),
            },
            now,
        );
        let r = state.reconcile(
            Observation::FocusIn {
                id: "u".into(),
                frame: frame.clone(),
                text: None,
            },
            now + Duration::from_millis(200),
        );
        assert_eq!(r.suppressed, Some(Suppression::SubmitGrace));
        let r = state.reconcile(
            Observation::FocusIn {
                id: "u".into(),
                frame,
                text: None,
            },
            now + Duration::from_millis(600),
        );
        assert_eq!(r.suppressed, None);
    }

    #[test]
    fn snapshot_values_feed_builder_as_page_input() {
        let mut fields = login_fields();
        fields[0].value = Some("prefilled".into());
        let (state, _) = loaded_state(fields);
        let current = state.credentials.current();
        assert_eq!(current.username.as_deref(), Some("prefilled"));
        assert!(!current.has_user_input);
    }

    #[test]
    fn message_without_frame_targets_main_frame() {
        let main = FrameRef::new("https://a.com/");
        let observation = Observation::from_message(
            BridgeMessage::TextInputFocusOut {
                id: "u".into(),
                frame: None,
            },
            Some(&main),
        );
        assert_eq!(
            observation,
            Observation::FocusOut {
                id: "u".into(),
                frame: main
            }
        );
    }
}
