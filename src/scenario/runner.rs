use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::LOG_INTERNAL;
use crate::builder::host::minimized_host;
use crate::cli::config::AutofillConfig;
use crate::error::{AutofillError, Result};
use crate::protocol::field_model::FieldSnapshot;
use crate::protocol::messages::{BridgeMessage, FrameRef};
use crate::scenario::context::ScenarioContext;
use crate::scenario::page::ScriptedPage;
use crate::scenario::recording_menu::RecordingMenu;
use crate::scenario::scenario_model::{AssertionResult, Scenario, ScenarioAssertion, ScenarioResult, ScenarioStep};
use crate::session::controller::{Controller, Outcome};
use crate::session::menu::SavePrompt;
use crate::store::memory::{InMemoryCreditCardStore, InMemoryPasswordStore};
use crate::store::store_model::{Credential, CreditCardEntry};
use crate::store::{CreditCardStore, PasswordStore};
use crate::trace::logger::TraceLogger;

/// Snapshot requests answered per driver call before giving up on a page
/// that keeps asking.
const MAX_FIELD_ROUNDS: usize = 8;

/// A controller wired to a scripted page, a recording menu and in-memory
/// stores, with helpers that post events the way a page script does.
pub struct ScenarioHarness {
    pub page: Arc<ScriptedPage>,
    pub menu: Arc<RecordingMenu>,
    pub passwords: Arc<InMemoryPasswordStore>,
    pub cards: Arc<InMemoryCreditCardStore>,
    pub controller: Controller,
    pub url: String,
    pub main_frame: FrameRef,
}

impl ScenarioHarness {
    pub fn new(
        url: &str,
        config: &AutofillConfig,
        accept_prompts: bool,
        passwords: Vec<Credential>,
        cards: Vec<CreditCardEntry>,
    ) -> Self {
        let page = Arc::new(ScriptedPage::new());
        let menu = Arc::new(RecordingMenu::new(accept_prompts));
        let password_store = Arc::new(InMemoryPasswordStore::with_credentials(passwords));
        let card_store = Arc::new(InMemoryCreditCardStore::with_cards(cards));
        let controller = Controller::new(
            page.clone(),
            password_store.clone(),
            card_store.clone(),
            menu.clone(),
            config,
        );
        ScenarioHarness {
            page,
            menu,
            passwords: password_store,
            cards: card_store,
            controller,
            url: url.to_string(),
            main_frame: FrameRef::new(url),
        }
    }

    pub fn with_tracer(mut self, tracer: TraceLogger) -> Self {
        self.controller = self.controller.with_tracer(tracer);
        self
    }

    pub fn frame(&self, href: Option<&str>) -> FrameRef {
        href.map(FrameRef::new).unwrap_or_else(|| self.main_frame.clone())
    }

    /// Post `loaded` for the main frame and answer the snapshot request.
    pub async fn load(&self) -> Outcome {
        let mut outcome = self
            .controller
            .handle_message(BridgeMessage::Loaded {
                url: self.url.clone(),
                frame: None,
            })
            .await;
        outcome.extend(self.pump().await);
        outcome
    }

    /// Answer queued `sendTextFields` requests with the page's snapshot.
    pub async fn pump(&self) -> Outcome {
        let mut outcome = Outcome::default();
        for _ in 0..MAX_FIELD_ROUNDS {
            let requests = self.page.take_field_requests();
            if requests.is_empty() {
                break;
            }
            for frame in requests {
                outcome.extend(self.post_fields(&frame).await);
            }
        }
        outcome
    }

    async fn post_fields(&self, frame: &FrameRef) -> Outcome {
        let fields = self.page.snapshot(frame);
        self.controller
            .handle_message(BridgeMessage::TextInputFields {
                fields,
                frame: Some(frame.clone()),
            })
            .await
    }

    /// The page's fields change and its mutation observer posts a snapshot.
    pub async fn set_fields(&self, frame: &FrameRef, fields: Vec<FieldSnapshot>) -> Outcome {
        self.page.set_fields(frame, fields);
        let mut outcome = self.post_fields(frame).await;
        outcome.extend(self.pump().await);
        outcome
    }

    pub async fn load_frame(&self, href: &str) -> Outcome {
        let mut outcome = self
            .controller
            .handle_message(BridgeMessage::Loaded {
                url: href.to_string(),
                frame: Some(FrameRef::new(href)),
            })
            .await;
        outcome.extend(self.pump().await);
        outcome
    }

    pub async fn focus_in(&self, frame: &FrameRef, id: &str) -> Outcome {
        self.page.set_focused(Some((frame.clone(), id.to_string())));
        let text = self.page.value(frame, id);
        let mut outcome = self
            .controller
            .handle_message(BridgeMessage::TextInputFocusIn {
                id: id.to_string(),
                text,
                frame: Some(frame.clone()),
            })
            .await;
        outcome.extend(self.pump().await);
        outcome
    }

    pub async fn focus_out(&self, frame: &FrameRef, id: &str) -> Outcome {
        if self.page.focused().is_some_and(|(f, focused)| f == *frame && focused == id) {
            self.page.set_focused(None);
        }
        self.controller
            .handle_message(BridgeMessage::TextInputFocusOut {
                id: id.to_string(),
                frame: Some(frame.clone()),
            })
            .await
    }

    pub fn type_value(&self, frame: &FrameRef, id: &str, value: &str) -> Result<()> {
        if self.page.set_value(frame, id, value) {
            Ok(())
        } else {
            Err(AutofillError::Scenario(format!("no field {:?} in {}", id, frame)))
        }
    }

    pub async fn submit(&self, frame: &FrameRef, id: &str) -> Outcome {
        self.controller
            .handle_message(BridgeMessage::FormSubmit {
                id: id.to_string(),
                frame: Some(frame.clone()),
            })
            .await
    }

    /// Host the session currently runs on, falling back to the scenario URL.
    pub fn host(&self) -> Option<String> {
        self.controller.host().or_else(|| minimized_host(&self.url))
    }

    pub fn stored_password(&self, host: &str, username: &str) -> Option<String> {
        self.passwords
            .credentials()
            .into_iter()
            .find(|c| c.host == host && c.username == username)
            .map(|c| c.password)
    }
}

/// Executes a `Scenario` step by step against a fresh harness.
pub struct ScenarioRunner;

impl ScenarioRunner {
    pub async fn run(scenario: &Scenario, config: &AutofillConfig, trace: Option<&Path>) -> ScenarioResult {
        let mut config = config.clone();
        if let Some(features) = scenario.features {
            config.features = features;
        }
        let mut harness = ScenarioHarness::new(
            &scenario.url,
            &config,
            scenario.accept_prompts,
            scenario.stored_passwords.clone(),
            scenario.stored_cards.clone(),
        );
        if let Some(path) = trace {
            harness = harness.with_tracer(TraceLogger::new(path));
        }

        let mut ctx = ScenarioContext::new();
        harness.load().await;

        for (i, step) in scenario.steps.iter().enumerate() {
            ctx.current_step = i;
            debug!(target: LOG_INTERNAL, step = i, action = step.name(), "scenario step");
            if let Err(e) = Self::execute_step(step, i, &harness, &mut ctx).await {
                return ScenarioResult {
                    scenario_name: scenario.name.clone(),
                    passed: false,
                    steps_run: i + 1,
                    assertion_results: ctx.assertion_results,
                    error: Some(format!("Step {} ({}) failed: {}", i, step.name(), e)),
                };
            }
        }

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            passed: ctx.all_passed(),
            steps_run: scenario.steps.len(),
            assertion_results: ctx.assertion_results,
            error: None,
        }
    }

    async fn execute_step(
        step: &ScenarioStep,
        step_index: usize,
        harness: &ScenarioHarness,
        ctx: &mut ScenarioContext,
    ) -> Result<()> {
        match step {
            ScenarioStep::Fields { fields, frame } => {
                let frame = harness.frame(frame.as_deref());
                harness.set_fields(&frame, fields.clone()).await;
            }
            ScenarioStep::LoadFrame { href } => {
                harness.load_frame(href).await;
            }
            ScenarioStep::FrameBounds { frames } => {
                harness
                    .controller
                    .handle_message(BridgeMessage::FrameBounds { frames: frames.clone() })
                    .await;
            }
            ScenarioStep::FocusIn { id, frame } => {
                harness.focus_in(&harness.frame(frame.as_deref()), id).await;
            }
            ScenarioStep::FocusOut { id, frame } => {
                harness.focus_out(&harness.frame(frame.as_deref()), id).await;
            }
            ScenarioStep::Type { id, value, frame } => {
                harness.type_value(&harness.frame(frame.as_deref()), id, value)?;
            }
            ScenarioStep::Submit { id, frame } => {
                harness.submit(&harness.frame(frame.as_deref()), id).await;
            }
            ScenarioStep::Resize { width, height } => {
                harness
                    .controller
                    .handle_message(BridgeMessage::Resize {
                        width: *width,
                        height: *height,
                    })
                    .await;
            }
            ScenarioStep::Scroll {
                href,
                scroll_x,
                scroll_y,
            } => {
                harness
                    .controller
                    .handle_message(BridgeMessage::FrameScroll {
                        href: href.clone(),
                        scroll_x: *scroll_x,
                        scroll_y: *scroll_y,
                    })
                    .await;
            }
            ScenarioStep::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
            }
            ScenarioStep::ClickIcon => harness.controller.icon_clicked().await,
            ScenarioStep::PickCredential { username } => {
                let host = harness
                    .host()
                    .ok_or_else(|| AutofillError::Scenario("page has no host".into()))?;
                let entry = harness
                    .passwords
                    .entries_for_host(&host)?
                    .into_iter()
                    .find(|e| e.username == *username)
                    .ok_or_else(|| AutofillError::Scenario(format!("no stored login {:?} for {}", username, host)))?;
                harness.controller.fill_credentials(&entry).await;
            }
            ScenarioStep::PickCard { number } => {
                let card = harness
                    .cards
                    .fetch_all()?
                    .into_iter()
                    .find(|c| c.card_number == *number)
                    .ok_or_else(|| AutofillError::Scenario(format!("no stored card ending {}", last_four(number))))?;
                harness.controller.fill_credit_card(&card).await;
            }
            ScenarioStep::GeneratePassword { password } => {
                harness.controller.fill_new_password(password, true).await;
            }
            ScenarioStep::Dismiss => harness.controller.dismiss().await,
            ScenarioStep::Assert { assertions } => {
                let results = assertions
                    .iter()
                    .map(|a| Self::evaluate_one(a, step_index, harness))
                    .collect();
                ctx.record_assertions(results);
            }
        }
        Ok(())
    }

    fn evaluate_one(assertion: &ScenarioAssertion, step_index: usize, harness: &ScenarioHarness) -> AssertionResult {
        let (passed, actual, failure) = match assertion {
            ScenarioAssertion::PromptCount { expected } => {
                let count = harness.menu.prompts().len();
                (
                    count == *expected,
                    Some(count.to_string()),
                    format!("expected {} save prompts", expected),
                )
            }
            ScenarioAssertion::LastPrompt { expected } => {
                let last = harness.menu.prompts().last().map(prompt_kind);
                (
                    last == Some(expected.as_str()),
                    last.map(str::to_string),
                    format!("last prompt is not {}", expected),
                )
            }
            ScenarioAssertion::StoredPassword {
                username,
                host,
                expected,
            } => {
                let host = host.clone().or_else(|| harness.host()).unwrap_or_default();
                let stored = harness.stored_password(&host, username);
                (
                    stored == *expected,
                    stored.clone(),
                    format!("stored password for {}@{} differs", username, host),
                )
            }
            ScenarioAssertion::StoredCardCount { expected } => match harness.cards.fetch_all() {
                Ok(cards) => (
                    cards.len() == *expected,
                    Some(cards.len().to_string()),
                    format!("expected {} stored cards", expected),
                ),
                Err(e) => (false, None, format!("card store failed: {}", e)),
            },
            ScenarioAssertion::GroupAction { id, frame, expected } => {
                let action = harness
                    .controller
                    .group_for(id, &harness.frame(frame.as_deref()))
                    .map(|g| g.action);
                (
                    action == *expected,
                    action.map(|a| format!("{:?}", a)),
                    format!("group action of {} differs", id),
                )
            }
            ScenarioAssertion::FieldRole { id, frame, expected } => {
                let role = harness
                    .controller
                    .field_role(id, &harness.frame(frame.as_deref()));
                (
                    role == *expected,
                    role.map(|r| format!("{:?}", r)),
                    format!("role of {} differs", id),
                )
            }
            ScenarioAssertion::Ambiguous { id, expected } => {
                let ambiguous = harness
                    .controller
                    .group_for(id, &harness.main_frame)
                    .is_some_and(|g| g.is_ambiguous);
                (
                    ambiguous == *expected,
                    Some(ambiguous.to_string()),
                    format!("ambiguity of the group of {} differs", id),
                )
            }
            ScenarioAssertion::MenuVisible { expected } => {
                let visible = harness.menu.visible_menu().is_some();
                (
                    visible == *expected,
                    Some(visible.to_string()),
                    format!("menu visibility should be {}", expected),
                )
            }
            ScenarioAssertion::IconOn { expected } => {
                let icon = harness.menu.icon_field();
                (
                    icon == *expected,
                    icon.clone(),
                    "icon is on another field".to_string(),
                )
            }
            ScenarioAssertion::FieldValue { id, frame, expected } => {
                let value = harness.page.value(&harness.frame(frame.as_deref()), id);
                (
                    value.as_deref() == Some(expected.as_str()),
                    value.clone(),
                    format!("value of {} differs", id),
                )
            }
            ScenarioAssertion::AlertShown { category } => {
                let alerts = harness.menu.alerts();
                let shown = alerts.iter().any(|e| e.category() == category.as_str());
                (
                    shown,
                    Some(alerts.iter().map(|e| e.category()).collect::<Vec<_>>().join(",")),
                    format!("no {} alert shown", category),
                )
            }
        };

        AssertionResult {
            step_index,
            assertion: assertion.clone(),
            passed,
            actual,
            message: if passed { None } else { Some(failure) },
        }
    }
}

pub fn prompt_kind(prompt: &SavePrompt) -> &'static str {
    match prompt {
        SavePrompt::SavePassword { .. } => "savePassword",
        SavePrompt::UpdatePassword { .. } => "updatePassword",
        SavePrompt::SaveCreditCard { .. } => "saveCreditCard",
        SavePrompt::UpdateCreditCard { .. } => "updateCreditCard",
    }
}

fn last_four(number: &str) -> &str {
    let start = number.len().saturating_sub(4);
    number.get(start..).unwrap_or(number)
}

/// Load scenarios from a single YAML file or a directory of YAML files.
pub fn load_scenarios(path: &str) -> Result<Vec<Scenario>> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_dir() {
        let mut scenarios = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let p = entry?.path();
            if p.extension().is_some_and(|e| e == "yaml" || e == "yml") {
                let content = std::fs::read_to_string(&p)?;
                scenarios.push(serde_yaml::from_str(&content)?);
            }
        }
        // Sort by name for deterministic order
        scenarios.sort_by(|a: &Scenario, b: &Scenario| a.name.cmp(&b.name));
        Ok(scenarios)
    } else {
        let content = std::fs::read_to_string(path)?;
        Ok(vec![serde_yaml::from_str(&content)?])
    }
}
