use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::LOG_INTERNAL;
use crate::classifier::rules::HostRule;
use crate::error::{AutofillError, Result};
use crate::protocol::field_model::AutofillAction;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "form-autofill",
    version,
    about = "Web form autofill engine: field classification and scripted sessions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: form-autofill.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a field snapshot and print the group table as JSON
    Classify {
        /// JSON file holding an array of field snapshots
        #[arg(long)]
        fields: String,

        /// Page URL, selects host-specific rules
        #[arg(long)]
        url: Option<String>,
    },

    /// Run scenario YAML files against a scripted page
    Run {
        /// Path to a scenario YAML file or a directory of YAML files
        #[arg(long)]
        scenario: String,

        /// Output format: console, json
        #[arg(long, default_value = "console")]
        format: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,

        /// Append session transitions to this JSONL file
        #[arg(long)]
        trace: Option<String>,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `form-autofill.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AutofillConfig {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub appearance: AppearanceConfig,
    #[serde(default)]
    pub host_rules: Vec<HostRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Passwords,
    CreditCards,
    PersonalInfo,
}

impl Feature {
    pub fn for_action(action: AutofillAction) -> Feature {
        match action {
            AutofillAction::Login | AutofillAction::CreateAccount => Feature::Passwords,
            AutofillAction::Payment => Feature::CreditCards,
            AutofillAction::PersonalInfo => Feature::PersonalInfo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub passwords: bool,

    #[serde(default = "default_true")]
    pub credit_cards: bool,

    #[serde(default = "default_true")]
    pub personal_info: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            passwords: true,
            credit_cards: true,
            personal_info: true,
        }
    }
}

impl FeatureConfig {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Passwords => self.passwords,
            Feature::CreditCards => self.credit_cards,
            Feature::PersonalInfo => self.personal_info,
        }
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::Passwords => self.passwords = enabled,
            Feature::CreditCards => self.credit_cards = enabled,
            Feature::PersonalInfo => self.personal_info = enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// A focus-in on the field that just lost focus is ignored this long.
    #[serde(default = "default_debounce_ms")]
    pub focus_debounce_ms: u64,

    /// Focus-triggered UI stays off this long after a submit.
    #[serde(default = "default_submit_grace_ms")]
    pub submit_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            focus_debounce_ms: default_debounce_ms(),
            submit_grace_ms: default_submit_grace_ms(),
        }
    }
}

impl TimingConfig {
    pub fn focus_debounce(&self) -> Duration {
        Duration::from_millis(self.focus_debounce_ms)
    }

    pub fn submit_grace(&self) -> Duration {
        Duration::from_millis(self.submit_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceConfig {
    /// Background applied by the page script to fields the engine filled.
    #[serde(default = "default_highlight")]
    pub highlight_color: String,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            highlight_color: default_highlight(),
        }
    }
}

// Serde default helpers
fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { 100 }
fn default_submit_grace_ms() -> u64 { 500 }
fn default_highlight() -> String { "#FFF6D5".to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

const DEFAULT_CONFIG_PATH: &str = "form-autofill.yaml";

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AutofillConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            warn!(target: LOG_INTERNAL, path = config_path, error = %e, "malformed config, using defaults");
            AutofillConfig::default()
        }),
        Err(_) => AutofillConfig::default(),
    }
}

/// Load config from a YAML file, surfacing read and parse errors.
pub fn load_config_strict(path: &str) -> Result<AutofillConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AutofillConfig = serde_yaml::from_str(&content)?;
    if !is_hex_color(&config.appearance.highlight_color) {
        return Err(AutofillError::Config(format!(
            "highlight_color {:?} is not a #RGB or #RRGGBB color",
            config.appearance.highlight_color
        )));
    }
    Ok(config)
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::rules::Condition;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
features:
  credit_cards: false
host_rules:
  - host: example.com
    rules:
      discard_autocomplete_attribute: always
"#;
        let config: AutofillConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.features.passwords);
        assert!(!config.features.credit_cards);
        assert_eq!(config.timing.focus_debounce_ms, 100);
        assert_eq!(config.appearance.highlight_color, "#FFF6D5");
        assert_eq!(
            config.host_rules[0].rules.discard_autocomplete_attribute,
            Condition::Always
        );
    }

    #[test]
    fn missing_or_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert_eq!(load_config(missing.to_str()), AutofillConfig::default());

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "features: [not, a, map").unwrap();
        assert_eq!(load_config(broken.to_str()), AutofillConfig::default());
        assert!(load_config_strict(broken.to_str().unwrap()).is_err());

        let bad_color = dir.path().join("color.yaml");
        std::fs::write(&bad_color, "appearance:\n  highlight_color: yellow\n").unwrap();
        assert!(matches!(
            load_config_strict(bad_color.to_str().unwrap()),
            Err(AutofillError::Config(_))
        ));
    }

    #[test]
    fn features_map_to_actions() {
        let mut features = FeatureConfig::default();
        features.set(Feature::for_action(AutofillAction::CreateAccount), false);
        assert!(!features.is_enabled(Feature::Passwords));
        assert!(features.is_enabled(Feature::for_action(AutofillAction::Payment)));
    }
}
