use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::builder::credentials::Credentials;
use crate::cli::config::{AutofillConfig, Feature};
use crate::error::StoreError;
use crate::frames::locator::FieldLocator;
use crate::protocol::bridge::PageBridge;
use crate::protocol::field_model::{AutofillAction, AutofillGroup, FieldRole};
use crate::protocol::messages::{BridgeMessage, FieldAutofill, FrameRef};
use crate::session::menu::{AutofillMenu, MenuAnchor, MenuOptions, MenuViewModel, SavePrompt, similar_field_ids};
use crate::session::save::{PasswordSaveAction, merge_with_stored_card, password_save_action};
use crate::session::state_machine::{Effect, FocusState, FocusedField, Observation, Reconciliation, SessionState, Suppression};
use crate::store::store_model::{CreditCardEntry, PasswordEntry};
use crate::store::{CreditCardStore, PasswordStore};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::TraceEvent;
use crate::{LOG_INTERNAL, LOG_PASSWORDS};

/// Result of feeding one observation through the controller, including any
/// follow-up observations it triggered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub effects: Vec<String>,
    pub suppressed: Vec<Suppression>,
}

impl Outcome {
    pub fn was_suppressed(&self, reason: Suppression) -> bool {
        self.suppressed.contains(&reason)
    }

    pub fn ran(&self, effect_prefix: &str) -> bool {
        self.effects.iter().any(|e| e.starts_with(effect_prefix))
    }

    pub fn extend(&mut self, other: Outcome) {
        self.effects.extend(other.effects);
        self.suppressed.extend(other.suppressed);
    }
}

/// Per-tab autofill session.
///
/// State transitions are synchronous under one lock; page round trips,
/// store calls and menu calls happen afterwards with the lock released.
/// Every continuation re-checks the session epoch (and, for field UI, the
/// focused field) before touching state.
pub struct Controller {
    bridge: Arc<dyn PageBridge>,
    passwords: Arc<dyn PasswordStore>,
    cards: Arc<dyn CreditCardStore>,
    menu: Arc<dyn AutofillMenu>,
    highlight_color: String,
    state: RwLock<SessionState>,
    tracer: Option<TraceLogger>,
}

impl Controller {
    pub fn new(
        bridge: Arc<dyn PageBridge>,
        passwords: Arc<dyn PasswordStore>,
        cards: Arc<dyn CreditCardStore>,
        menu: Arc<dyn AutofillMenu>,
        config: &AutofillConfig,
    ) -> Self {
        Controller {
            bridge,
            passwords,
            cards,
            menu,
            highlight_color: config.appearance.highlight_color.clone(),
            state: RwLock::new(SessionState::new(config)),
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: TraceLogger) -> Self {
        self.tracer = Some(tracer);
        self
    }

    // ========================================================================
    // Read accessors
    // ========================================================================

    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    pub fn host(&self) -> Option<String> {
        self.state.read().host.clone()
    }

    pub fn main_frame(&self) -> Option<FrameRef> {
        self.state.read().main_frame.clone()
    }

    /// `idle`, `focused(<id>)` or `submitInFlight`.
    pub fn focus_label(&self) -> String {
        self.state.read().focus.to_string()
    }

    pub fn focused_field(&self) -> Option<String> {
        self.state.read().focused().map(|f| f.element_id.clone())
    }

    pub fn group_for(&self, element_id: &str, frame: &FrameRef) -> Option<AutofillGroup> {
        self.state.read().classifier.autofill_group(element_id, frame).cloned()
    }

    pub fn field_role(&self, element_id: &str, frame: &FrameRef) -> Option<FieldRole> {
        self.state.read().classifier.field_role(element_id, frame)
    }

    pub fn credentials(&self) -> Credentials {
        self.state.read().credentials.current()
    }

    pub fn unsaved_credentials(&self, allow_empty_username: bool) -> Option<Credentials> {
        self.state.read().credentials.unsaved_credentials(allow_empty_username)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decode and handle one raw page message. Malformed payloads are logged
    /// and dropped.
    pub async fn handle_payload(&self, payload: &str) -> Option<Outcome> {
        match BridgeMessage::parse(payload) {
            Ok(message) => Some(self.handle_message(message).await),
            Err(e) => {
                warn!(target: LOG_INTERNAL, error = %e, "dropping malformed bridge payload");
                None
            }
        }
    }

    pub async fn handle_message(&self, message: BridgeMessage) -> Outcome {
        let observation = {
            let state = self.state.read();
            Observation::from_message(message, state.main_frame.as_ref())
        };
        self.observe(observation).await
    }

    /// Run one observation through the state machine and execute its
    /// effects. Effects that learn something new (the focused field after
    /// handler install) queue a follow-up observation.
    pub async fn observe(&self, observation: Observation) -> Outcome {
        let mut outcome = Outcome::default();
        let mut queue = VecDeque::from([observation]);

        while let Some(observation) = queue.pop_front() {
            let (epoch, reconciliation) = self.reconcile(observation);
            if let Some(reason) = reconciliation.suppressed {
                debug!(target: LOG_INTERNAL, reason = %reason, "focus UI suppressed");
                outcome.suppressed.push(reason);
            }
            for effect in reconciliation.effects {
                outcome.effects.push(effect.to_string());
                if let Some(next) = self.run_effect(epoch, effect).await {
                    queue.push_back(next);
                }
            }
        }
        outcome
    }

    fn reconcile(&self, observation: Observation) -> (u64, Reconciliation) {
        let label = observation.to_string();
        let (epoch, reconciliation, event) = {
            let mut state = self.state.write();
            let before = state.focus.to_string();
            let reconciliation = state.reconcile(observation, Instant::now());
            let event = self.tracer.as_ref().map(|_| {
                TraceEvent::now(state.epoch, label, before)
                    .with_state_after(&state.focus)
                    .with_effects(&reconciliation.effects)
                    .with_suppression(reconciliation.suppressed)
            });
            (state.epoch, reconciliation, event)
        };
        if let (Some(tracer), Some(event)) = (&self.tracer, event) {
            tracer.log(&event);
        }
        (epoch, reconciliation)
    }

    // ========================================================================
    // Effects
    // ========================================================================

    async fn run_effect(&self, epoch: u64, effect: Effect) -> Option<Observation> {
        match effect {
            Effect::RequestFields {
                frame,
                frame_identifier,
            } => {
                if let Err(e) = self.bridge.send_text_fields(&frame, Some(frame_identifier)).await {
                    warn!(target: LOG_INTERNAL, frame = %frame, error = %e, "field request failed");
                }
                None
            }
            Effect::InstallHandlers {
                frame,
                ids,
                submit_handler,
            } => {
                if submit_handler {
                    if let Err(e) = self.bridge.install_submit_handler(&frame).await {
                        warn!(target: LOG_INTERNAL, frame = %frame, error = %e, "submit handler install failed");
                    }
                }
                if let Err(e) = self.bridge.install_focus_handlers(&ids, &frame).await {
                    warn!(target: LOG_INTERNAL, frame = %frame, error = %e, "focus handler install failed");
                }
                None
            }
            Effect::QueryFocusedField { frame } => {
                let focused = self.bridge.get_focused_field(&frame).await;
                if self.epoch() != epoch {
                    return None;
                }
                match focused {
                    Ok(Some(id)) if !id.is_empty() => Some(Observation::FocusIn { id, frame, text: None }),
                    Ok(_) => None,
                    Err(e) => {
                        debug!(target: LOG_INTERNAL, error = %e, "focused field query failed");
                        None
                    }
                }
            }
            Effect::Teardown { element_id } => {
                debug!(target: LOG_INTERNAL, id = %element_id, "teardown");
                self.menu.dismiss().await;
                None
            }
            Effect::CaptureValues {
                frame,
                fallback_to_last,
            } => {
                self.capture_values(epoch, frame, fallback_to_last).await;
                None
            }
            Effect::SaveCreditCard => {
                self.save_credit_card().await;
                None
            }
            Effect::SaveCredentials {
                allow_empty_username,
            } => {
                self.save_credentials(allow_empty_username).await;
                None
            }
            Effect::FinishSubmit => {
                let mut state = self.state.write();
                if state.epoch == epoch {
                    state.classifier.clear();
                    if matches!(state.focus, FocusState::SubmitInFlight) {
                        state.focus = FocusState::Idle;
                    }
                }
                None
            }
            Effect::Setup {
                element_id,
                frame,
                group,
                locator,
            } => {
                self.setup_field(epoch, &element_id, &frame, &group, &locator).await;
                None
            }
        }
    }

    async fn capture_values(&self, epoch: u64, frame: FrameRef, fallback_to_last: bool) {
        let ids = self.state.read().classifier.all_input_field_ids(&frame);
        let result = if ids.is_empty() {
            Ok(Vec::new())
        } else {
            self.bridge.get_text_field_values(&ids, &frame).await
        };

        let mut state = self.state.write();
        if state.epoch != epoch {
            debug!(target: LOG_INTERNAL, "dropping values captured for a previous page");
            return;
        }
        let values: HashMap<String, String> = match result {
            Ok(values) if !ids.is_empty() => ids
                .into_iter()
                .zip(values)
                .filter_map(|(id, value)| value.map(|v| (id, v)))
                .collect(),
            Ok(_) => return,
            Err(e) => {
                warn!(target: LOG_INTERNAL, frame = %frame, error = %e, "could not read field values");
                match state.values_on_focus_out.clone() {
                    Some((last_frame, values)) if fallback_to_last && last_frame == frame => values,
                    _ => return,
                }
            }
        };
        state.values_on_focus_out = Some((frame.clone(), values.clone()));
        state.record_values(&values, &frame, true);
    }

    fn is_current_focus(&self, epoch: u64, element_id: &str) -> bool {
        let state = self.state.read();
        state.epoch == epoch && state.focused().is_some_and(|f| f.element_id == element_id)
    }

    fn focused_snapshot(&self) -> Option<(u64, FocusedField)> {
        let state = self.state.read();
        state.focused().map(|f| (state.epoch, f.clone()))
    }

    fn anchor(locator: &FieldLocator) -> MenuAnchor {
        MenuAnchor {
            element_id: locator.element_id().to_string(),
            frame: locator.frame().clone(),
            rect: locator.current(),
            updates: locator.subscribe(),
        }
    }

    async fn setup_field(
        &self,
        epoch: u64,
        element_id: &str,
        frame: &FrameRef,
        group: &AutofillGroup,
        locator: &FieldLocator,
    ) {
        if let Err(e) = locator.refresh(self.bridge.as_ref()).await {
            debug!(target: LOG_INTERNAL, id = %element_id, error = %e, "could not measure field");
        }
        if !self.is_current_focus(epoch, element_id) {
            debug!(target: LOG_INTERNAL, id = %element_id, "focus moved before setup finished");
            return;
        }

        let anchor = Self::anchor(locator);
        self.menu.show_icon(&anchor, group.action).await;

        match group.action {
            AutofillAction::Payment => self.show_card_menu(&anchor).await,
            AutofillAction::Login | AutofillAction::CreateAccount => {
                let Some(empty) = self.similar_fields_empty(element_id, frame, group).await else {
                    return;
                };
                if !self.is_current_focus(epoch, element_id) {
                    return;
                }
                if !empty || group.is_ambiguous {
                    return;
                }
                let Some(options) = MenuOptions::for_field(element_id, empty, group) else {
                    return;
                };
                match self.password_menu(options) {
                    Ok(Some(model)) if has_significant_contents(&model) => {
                        self.menu.show_menu(&anchor, model).await;
                    }
                    Ok(_) => {}
                    Err(e) => self.alert(e).await,
                }
            }
            AutofillAction::PersonalInfo => {}
        }
    }

    /// `None` when the page could not be asked.
    async fn similar_fields_empty(&self, element_id: &str, frame: &FrameRef, group: &AutofillGroup) -> Option<bool> {
        let ids = similar_field_ids(element_id, group);
        match self.bridge.get_text_field_values(&ids, frame).await {
            Ok(values) => Some(values.iter().all(|v| v.as_deref().is_none_or(str::is_empty))),
            Err(e) => {
                debug!(target: LOG_INTERNAL, id = %element_id, error = %e, "could not read field values");
                None
            }
        }
    }

    fn password_menu(&self, options: MenuOptions) -> Result<Option<MenuViewModel>, StoreError> {
        let (host, suggested) = {
            let state = self.state.read();
            (state.host.clone(), state.credentials.suggested_entry())
        };
        let Some(host) = host else {
            return Ok(None);
        };
        let entries = if options.shows_existing_credentials() {
            self.passwords.entries_for_host(&host)?
        } else {
            Vec::new()
        };
        Ok(Some(MenuViewModel::Passwords {
            host,
            options,
            entries,
            suggested,
        }))
    }

    async fn show_card_menu(&self, anchor: &MenuAnchor) {
        match self.cards.fetch_all() {
            Ok(entries) if !entries.is_empty() => {
                self.menu.show_menu(anchor, MenuViewModel::CreditCards { entries }).await;
            }
            Ok(_) => {}
            Err(e) => self.alert(e).await,
        }
    }

    async fn alert(&self, error: StoreError) {
        error!(target: LOG_PASSWORDS, category = error.category(), detail = error.detail(), "store failure");
        self.menu.show_alert(&error).await;
    }

    // ========================================================================
    // Saving
    // ========================================================================

    async fn save_credentials(&self, allow_empty_username: bool) {
        let decision = {
            let mut state = self.state.write();
            if !state.is_enabled(AutofillAction::Login) {
                return;
            }
            let Some(host) = state.host.clone() else {
                return;
            };
            let Some(credentials) = state.credentials.unsaved_credentials(allow_empty_username) else {
                return;
            };
            match password_save_action(self.passwords.as_ref(), &host, &credentials) {
                Ok(Some(action)) => {
                    state.credentials.mark_saved();
                    Ok((host, credentials, action))
                }
                Ok(None) => {
                    debug!(target: LOG_PASSWORDS, host = %host, "credentials already stored");
                    return;
                }
                Err(e) => Err(e),
            }
        };
        let (host, credentials, action) = match decision {
            Ok(decision) => decision,
            Err(e) => return self.alert(e).await,
        };

        let username = credentials.username.unwrap_or_default();
        let Some(password) = credentials.password else {
            return;
        };
        let (save_host, prompt) = match action {
            PasswordSaveAction::SaveSilently => (host, None),
            PasswordSaveAction::Save => (
                host.clone(),
                Some(SavePrompt::SavePassword {
                    host,
                    username: username.clone(),
                }),
            ),
            PasswordSaveAction::Update(entry) => (
                entry.host.clone(),
                Some(SavePrompt::UpdatePassword {
                    host: entry.host,
                    username: username.clone(),
                }),
            ),
        };

        if let Some(prompt) = &prompt {
            if !self.menu.confirm_save(prompt).await {
                info!(target: LOG_PASSWORDS, host = %save_host, "save declined");
                return;
            }
        }
        match self.passwords.save(&save_host, &username, &password) {
            Ok(_) => info!(target: LOG_PASSWORDS, host = %save_host, update = prompt.as_ref().is_some_and(SavePrompt::is_update), "credentials saved"),
            Err(e) => self.alert(e).await,
        }
    }

    async fn save_credit_card(&self) {
        let card = {
            let mut state = self.state.write();
            if !state.is_enabled(AutofillAction::Payment) {
                return;
            }
            let Some(card) = state.cards.unsaved_card() else {
                return;
            };
            state.cards.mark_saved();
            card
        };

        let stored = match self.cards.fetch_all() {
            Ok(stored) => stored,
            Err(e) => return self.alert(e).await,
        };
        let Some(card) = merge_with_stored_card(card, &stored) else {
            debug!(target: LOG_INTERNAL, "card already stored");
            return;
        };

        let prompt = if card.database_id.is_some() {
            SavePrompt::UpdateCreditCard {
                description: card.description.clone(),
            }
        } else {
            SavePrompt::SaveCreditCard {
                description: card.description.clone(),
            }
        };
        if !self.menu.confirm_save(&prompt).await {
            return;
        }
        match self.cards.save(&card) {
            Ok(saved) => info!(target: LOG_INTERNAL, number = %saved.obfuscated_number(), "card saved"),
            Err(e) => self.alert(e).await,
        }
    }

    // ========================================================================
    // Menu delegate
    // ========================================================================

    /// Release the focused field: tear down its UI and record it for the
    /// re-focus debounce.
    async fn clear_focus(&self) {
        let released = {
            let mut state = self.state.write();
            let mut r = Reconciliation::default();
            state.release_focus(Some(Instant::now()), &mut r)
        };
        if released.is_some() {
            self.menu.dismiss().await;
        }
    }

    async fn fill(&self, fields: &[FieldAutofill], frame: &FrameRef) {
        if fields.is_empty() {
            return;
        }
        if let Err(e) = self.bridge.set_text_field_values(fields, frame).await {
            warn!(target: LOG_INTERNAL, frame = %frame, error = %e, "could not fill fields");
        }
    }

    fn highlighted(&self, ids: &[String], value: &str) -> Vec<FieldAutofill> {
        ids.iter()
            .map(|id| FieldAutofill::filled(id, value, Some(&self.highlight_color)))
            .collect()
    }

    /// The icon of the focused field was clicked: open its menu regardless
    /// of field content.
    pub async fn icon_clicked(&self) {
        let Some((epoch, field)) = self.focused_snapshot() else {
            return;
        };
        let anchor = Self::anchor(&field.locator);
        match field.group.action {
            AutofillAction::Payment => self.show_card_menu(&anchor).await,
            AutofillAction::Login | AutofillAction::CreateAccount => {
                let empty = self
                    .similar_fields_empty(&field.element_id, &field.frame, &field.group)
                    .await
                    .unwrap_or(false);
                if !self.is_current_focus(epoch, &field.element_id) {
                    return;
                }
                let Some(options) = MenuOptions::for_field(&field.element_id, empty, &field.group) else {
                    return;
                };
                match self.password_menu(options) {
                    Ok(Some(model)) => self.menu.show_menu(&anchor, model).await,
                    Ok(None) => {}
                    Err(e) => self.alert(e).await,
                }
            }
            AutofillAction::PersonalInfo => {}
        }
    }

    pub async fn fill_credentials(&self, entry: &PasswordEntry) {
        let Some((_, field)) = self.focused_snapshot() else {
            return;
        };
        let group = &field.group;
        if group.action != AutofillAction::Login && !group.is_ambiguous {
            error!(target: LOG_INTERNAL, action = ?group.action, "credentials picked for a non-login group");
            return self.clear_focus().await;
        }

        let password = match self.passwords.password(&entry.host, &entry.username) {
            Ok(password) => password,
            Err(e) => {
                self.clear_focus().await;
                return self.alert(e).await;
            }
        };
        if let Err(e) = self.passwords.mark_used(entry) {
            warn!(target: LOG_PASSWORDS, category = e.category(), "could not mark entry used");
        }
        self.state
            .write()
            .credentials
            .autofill(&entry.host, &entry.username, &password);

        let include_new = group.is_ambiguous;
        let usernames = group.ids_with_role(|r| r == FieldRole::CurrentUsername || (include_new && r == FieldRole::NewUsername));
        let passwords = group.ids_with_role(|r| r == FieldRole::CurrentPassword || (include_new && r == FieldRole::NewPassword));
        let mut fields = self.highlighted(&usernames, &entry.username);
        fields.extend(self.highlighted(&passwords, &password));

        info!(target: LOG_PASSWORDS, host = %entry.host, "filling stored credentials");
        self.fill(&fields, &field.frame).await;
        self.clear_focus().await;
    }

    /// Fill a suggested password into the new-password fields and reveal it.
    pub async fn fill_new_password(&self, password: &str, dismiss: bool) {
        let Some((_, field)) = self.focused_snapshot() else {
            return;
        };
        let group = &field.group;
        if group.action != AutofillAction::CreateAccount && !group.is_ambiguous {
            error!(target: LOG_INTERNAL, action = ?group.action, "password suggestion for a non-signup group");
            return self.clear_focus().await;
        }
        self.state.write().credentials.store_generated_password(password);

        let include_current = group.is_ambiguous;
        let ids = group.ids_with_role(|r| r == FieldRole::NewPassword || (include_current && r == FieldRole::CurrentPassword));
        self.fill(&self.highlighted(&ids, password), &field.frame).await;

        if let Err(e) = self.bridge.toggle_password_field_visibility(&ids, true, &field.frame).await {
            warn!(target: LOG_INTERNAL, error = %e, "could not reveal password");
        }
        if let Some(focused) = self.state.write().focused_mut() {
            if focused.element_id == field.element_id {
                focused.password_visible = true;
            }
        }
        if dismiss {
            self.menu.dismiss().await;
        }
    }

    /// Undo a password suggestion.
    pub async fn empty_password_field(&self) {
        let Some((_, field)) = self.focused_snapshot() else {
            return;
        };
        let ids = field.group.password_ids();
        let fields: Vec<FieldAutofill> = ids.iter().map(|id| FieldAutofill::filled(id, "", None)).collect();
        self.fill(&fields, &field.frame).await;
        if let Err(e) = self.bridge.toggle_password_field_visibility(&ids, false, &field.frame).await {
            warn!(target: LOG_INTERNAL, error = %e, "could not hide password");
        }
        self.clear_focus().await;
    }

    pub async fn fill_credit_card(&self, entry: &CreditCardEntry) {
        let Some((_, field)) = self.focused_snapshot() else {
            return;
        };
        if field.group.action != AutofillAction::Payment {
            error!(target: LOG_INTERNAL, action = ?field.group.action, "card picked for a non-payment group");
            return self.clear_focus().await;
        }
        self.state.write().cards.autofill(entry);

        let fields: Vec<FieldAutofill> = field
            .group
            .fields
            .iter()
            .filter_map(|f| {
                let value = match f.role {
                    FieldRole::CardNumber => entry.card_number.clone(),
                    FieldRole::CardHolder => entry.holder.clone(),
                    FieldRole::CardExpirationDate => entry.formatted_date(),
                    FieldRole::CardExpirationMonth => entry.formatted_month(),
                    FieldRole::CardExpirationYear => entry.formatted_year(),
                    _ => return None,
                };
                Some(FieldAutofill::filled(&f.id, &value, Some(&self.highlight_color)))
            })
            .collect();
        if let Some(id) = entry.database_id {
            if let Err(e) = self.cards.mark_used(id) {
                warn!(target: LOG_INTERNAL, category = e.category(), "could not mark card used");
            }
        }
        self.fill(&fields, &field.frame).await;
        self.clear_focus().await;
    }

    pub async fn delete_credentials(&self, entries: &[PasswordEntry]) {
        for entry in entries {
            if let Err(e) = self.passwords.mark_deleted(&entry.host, &entry.username) {
                return self.alert(e).await;
            }
            info!(target: LOG_PASSWORDS, host = %entry.host, "credentials deleted");
        }
    }

    pub async fn delete_credit_cards(&self, entries: &[CreditCardEntry]) {
        for id in entries.iter().filter_map(|e| e.database_id) {
            if let Err(e) = self.cards.mark_deleted(id) {
                return self.alert(e).await;
            }
        }
    }

    pub async fn dismiss_menu(&self) {
        self.menu.dismiss_menu().await;
    }

    /// Close every overlay of the focused field, hiding a revealed password.
    pub async fn dismiss(&self) {
        if let Some((_, field)) = self.focused_snapshot() {
            if field.password_visible {
                let ids = field.group.password_ids();
                if let Err(e) = self.bridge.toggle_password_field_visibility(&ids, false, &field.frame).await {
                    warn!(target: LOG_INTERNAL, error = %e, "could not hide password");
                }
            }
        }
        self.clear_focus().await;
    }

    /// Turning a feature off closes the UI of a focused field it covers.
    pub async fn set_feature_enabled(&self, feature: Feature, enabled: bool) {
        let covers_focus = {
            let mut state = self.state.write();
            state.features.set(feature, enabled);
            state
                .focused()
                .is_some_and(|f| Feature::for_action(f.group.action) == feature)
        };
        if !enabled && covers_focus {
            self.dismiss().await;
        }
    }
}

fn has_significant_contents(model: &MenuViewModel) -> bool {
    match model {
        MenuViewModel::Passwords {
            options,
            entries,
            suggested,
            ..
        } => options.suggests_new_password() || suggested.is_some() || !entries.is_empty(),
        MenuViewModel::CreditCards { entries } => !entries.is_empty(),
    }
}
