use serde::{Deserialize, Serialize};

use crate::cli::config::FeatureConfig;
use crate::protocol::field_model::{AutofillAction, FieldRole, FieldSnapshot};
use crate::protocol::messages::FrameInfo;
use crate::store::store_model::{Credential, CreditCardEntry};

/// A scripted autofill session, deserialized from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,

    /// Main frame URL; loading it starts the session.
    pub url: String,

    /// Overrides the feature flags of the loaded configuration.
    #[serde(default)]
    pub features: Option<FeatureConfig>,

    #[serde(default)]
    pub stored_passwords: Vec<Credential>,

    #[serde(default)]
    pub stored_cards: Vec<CreditCardEntry>,

    /// Answer given to save prompts.
    #[serde(default = "default_accept")]
    pub accept_prompts: bool,

    pub steps: Vec<ScenarioStep>,
}

fn default_accept() -> bool {
    true
}

/// One step. `frame` defaults to the main frame everywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// The page's fields change (initial render, DOM mutation).
    Fields {
        fields: Vec<FieldSnapshot>,
        #[serde(default)]
        frame: Option<String>,
    },

    /// A child frame finished loading.
    LoadFrame { href: String },

    FrameBounds { frames: Vec<FrameInfo> },

    FocusIn {
        id: String,
        #[serde(default)]
        frame: Option<String>,
    },

    FocusOut {
        id: String,
        #[serde(default)]
        frame: Option<String>,
    },

    /// The user types into a field. No event is posted.
    Type {
        id: String,
        value: String,
        #[serde(default)]
        frame: Option<String>,
    },

    Submit {
        id: String,
        #[serde(default)]
        frame: Option<String>,
    },

    Resize { width: f64, height: f64 },

    Scroll {
        href: String,
        #[serde(default)]
        scroll_x: f64,
        #[serde(default)]
        scroll_y: f64,
    },

    Wait { duration_ms: u64 },

    ClickIcon,

    /// Pick a stored login from the menu, by username.
    PickCredential { username: String },

    /// Pick a stored card from the menu, by number.
    PickCard { number: String },

    /// Accept a suggested password.
    GeneratePassword { password: String },

    Dismiss,

    Assert { assertions: Vec<ScenarioAssertion> },
}

impl ScenarioStep {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioStep::Fields { .. } => "fields",
            ScenarioStep::LoadFrame { .. } => "load_frame",
            ScenarioStep::FrameBounds { .. } => "frame_bounds",
            ScenarioStep::FocusIn { .. } => "focus_in",
            ScenarioStep::FocusOut { .. } => "focus_out",
            ScenarioStep::Type { .. } => "type",
            ScenarioStep::Submit { .. } => "submit",
            ScenarioStep::Resize { .. } => "resize",
            ScenarioStep::Scroll { .. } => "scroll",
            ScenarioStep::Wait { .. } => "wait",
            ScenarioStep::ClickIcon => "click_icon",
            ScenarioStep::PickCredential { .. } => "pick_credential",
            ScenarioStep::PickCard { .. } => "pick_card",
            ScenarioStep::GeneratePassword { .. } => "generate_password",
            ScenarioStep::Dismiss => "dismiss",
            ScenarioStep::Assert { .. } => "assert",
        }
    }
}

/// A check against the session, the page or the stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Number of save prompts raised so far.
    PromptCount { expected: usize },

    /// Kind of the last save prompt (`savePassword`, `updatePassword`,
    /// `saveCreditCard`, `updateCreditCard`).
    LastPrompt { expected: String },

    /// Password stored for `username` on the scenario host; `None` expects
    /// no entry.
    StoredPassword {
        username: String,
        #[serde(default)]
        host: Option<String>,
        expected: Option<String>,
    },

    StoredCardCount { expected: usize },

    GroupAction {
        id: String,
        #[serde(default)]
        frame: Option<String>,
        expected: Option<AutofillAction>,
    },

    FieldRole {
        id: String,
        #[serde(default)]
        frame: Option<String>,
        expected: Option<FieldRole>,
    },

    Ambiguous {
        id: String,
        expected: bool,
    },

    MenuVisible { expected: bool },

    IconOn { expected: Option<String> },

    FieldValue {
        id: String,
        #[serde(default)]
        frame: Option<String>,
        expected: String,
    },

    AlertShown { category: String },
}

impl ScenarioAssertion {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioAssertion::PromptCount { .. } => "PromptCount",
            ScenarioAssertion::LastPrompt { .. } => "LastPrompt",
            ScenarioAssertion::StoredPassword { .. } => "StoredPassword",
            ScenarioAssertion::StoredCardCount { .. } => "StoredCardCount",
            ScenarioAssertion::GroupAction { .. } => "GroupAction",
            ScenarioAssertion::FieldRole { .. } => "FieldRole",
            ScenarioAssertion::Ambiguous { .. } => "Ambiguous",
            ScenarioAssertion::MenuVisible { .. } => "MenuVisible",
            ScenarioAssertion::IconOn { .. } => "IconOn",
            ScenarioAssertion::FieldValue { .. } => "FieldValue",
            ScenarioAssertion::AlertShown { .. } => "AlertShown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionResult {
    /// Which step this assertion belongs to (0-indexed)
    pub step_index: usize,

    pub assertion: ScenarioAssertion,

    pub passed: bool,

    /// Actual value found (for debugging failed assertions)
    pub actual: Option<String>,

    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,

    /// Whether all steps ran and all assertions passed
    pub passed: bool,

    pub steps_run: usize,

    pub assertion_results: Vec<AssertionResult>,

    /// Error message if a step could not be executed (not assertion failure)
    pub error: Option<String>,
}

impl ScenarioResult {
    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertion_results.iter().filter(|r| !r.passed)
    }
}
