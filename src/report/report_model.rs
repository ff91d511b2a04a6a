use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scenario::scenario_model::ScenarioResult;

/// Outcome of one `run` over a scenario file or directory.
///
/// Scenarios fail in two ways: an assertion disagrees with what the session
/// did, or a step could not be driven at all (unknown field, missing stored
/// login). The two are counted apart because only the first says anything
/// about autofill behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// The scenario path the run was started with.
    pub suite_name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scenarios stopped by a step error before their remaining steps ran.
    pub errored: usize,
    pub assertions_total: usize,
    pub assertions_failed: usize,
    /// Failed assertion count per assertion kind, e.g. `LastPrompt`.
    pub failures_by_assertion: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn from_results(suite_name: &str, results: Vec<ScenarioResult>) -> Self {
        let mut failures_by_assertion = BTreeMap::new();
        for failed in results.iter().flat_map(|r| r.failed_assertions()) {
            *failures_by_assertion
                .entry(failed.assertion.name().to_string())
                .or_insert(0) += 1;
        }
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            suite_name: suite_name.to_string(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            errored: results.iter().filter(|r| r.error.is_some()).count(),
            assertions_total: results.iter().map(|r| r.assertion_results.len()).sum(),
            assertions_failed: failures_by_assertion.values().sum(),
            failures_by_assertion,
            duration_ms: None,
            results,
        }
    }

    pub fn with_duration(mut self, duration_ms: u128) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
