use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::LOG_INTERNAL;
use crate::builder::host::minimized_host;
use crate::classifier::classifier::FieldClassifier;
use crate::cli::config::AutofillConfig;
use crate::error::{AutofillError, Result};
use crate::protocol::field_model::{AutofillGroup, FieldRole, FieldSnapshot};
use crate::protocol::messages::FrameRef;
use crate::report::console::format_console_report;
use crate::report::report_model::SuiteReport;
use crate::scenario::runner::{ScenarioRunner, load_scenarios};

// ============================================================================
// classify subcommand
// ============================================================================

/// Group table printed by `classify`.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub host: Option<String>,
    pub groups: Vec<AutofillGroup>,
    /// Role of every field that passed the filters, grouped or not.
    pub roles: BTreeMap<String, FieldRole>,
}

pub fn classify_snapshot(fields: &[FieldSnapshot], url: Option<&str>, config: &AutofillConfig) -> ClassificationReport {
    let host = url.and_then(minimized_host);
    let frame = FrameRef::new(url.unwrap_or("about:blank"));
    let mut classifier = FieldClassifier::with_host_rules(config.host_rules.clone());
    classifier.classify(fields, host.as_deref(), &frame);

    let roles = classifier
        .all_input_field_ids(&frame)
        .into_iter()
        .filter_map(|id| classifier.field_role(&id, &frame).map(|role| (id, role)))
        .collect();
    ClassificationReport {
        host,
        groups: classifier.groups(&frame).to_vec(),
        roles,
    }
}

/// Classify a JSON array of field snapshots and return the report as JSON.
pub fn cmd_classify(fields_path: &str, url: Option<&str>, config: &AutofillConfig) -> Result<String> {
    let content = std::fs::read_to_string(fields_path)?;
    let fields: Vec<FieldSnapshot> = serde_json::from_str(&content)?;
    let report = classify_snapshot(&fields, url, config);
    info!(target: LOG_INTERNAL, fields = fields.len(), groups = report.groups.len(), "classified snapshot");
    Ok(serde_json::to_string_pretty(&report)?)
}

// ============================================================================
// run subcommand
// ============================================================================

/// Run scenarios and return whether all passed.
pub async fn cmd_run(
    scenario_path: &str,
    format: &str,
    output: Option<&str>,
    trace: Option<&str>,
    config: &AutofillConfig,
    verbose: u8,
) -> Result<bool> {
    let scenarios = load_scenarios(scenario_path)?;

    if scenarios.is_empty() {
        eprintln!("No scenarios found at: {}", scenario_path);
        return Ok(true);
    }

    if verbose > 0 {
        eprintln!("Running {} scenarios...", scenarios.len());
    }

    let start = std::time::Instant::now();
    let mut results = Vec::new();
    for scenario in &scenarios {
        if verbose > 0 {
            eprintln!("  Running: {}", scenario.name);
        }
        results.push(ScenarioRunner::run(scenario, config, trace.map(Path::new)).await);
    }

    let report = SuiteReport::from_results(scenario_path, results).with_duration(start.elapsed().as_millis());
    let all_passed = report.all_passed();

    let output_content = match format {
        "json" => serde_json::to_string_pretty(&report)?,
        "console" => format_console_report(&report),
        other => return Err(AutofillError::Config(format!("unknown output format {:?}", other))),
    };

    match output {
        Some(path) => std::fs::write(path, &output_content)?,
        None => print!("{}", output_content),
    }

    Ok(all_passed)
}
