use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::state_machine::{Effect, Suppression};

/// One session transition, written as a JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u128,
    pub epoch: u64,

    pub observation: String,

    pub state_before: String,
    pub state_after: String,

    pub effects: Vec<String>,

    pub suppression: Option<String>,
}

impl TraceEvent {
    pub fn now(epoch: u64, observation: impl ToString, state_before: impl ToString) -> Self {
        let state_before = state_before.to_string();
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            epoch,
            observation: observation.to_string(),
            state_after: state_before.clone(),
            state_before,
            effects: vec![],
            suppression: None,
        }
    }

    pub fn with_state_after(mut self, state: impl ToString) -> Self {
        self.state_after = state.to_string();
        self
    }

    pub fn with_effects(mut self, effects: &[Effect]) -> Self {
        self.effects = effects.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_suppression(mut self, reason: Option<Suppression>) -> Self {
        self.suppression = reason.map(|r| r.to_string());
        self
    }
}
