use crate::scenario::scenario_model::AssertionResult;

/// Execution state and results of a running scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioContext {
    /// Current step index (0-based)
    pub current_step: usize,

    pub assertion_results: Vec<AssertionResult>,
}

impl ScenarioContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_assertions(&mut self, results: Vec<AssertionResult>) {
        self.assertion_results.extend(results);
    }

    pub fn all_passed(&self) -> bool {
        self.assertion_results.iter().all(|r| r.passed)
    }
}
