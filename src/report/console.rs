use crate::report::report_model::SuiteReport;

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format a suite report for terminal output.
///
/// Produces output like:
/// ```text
/// === Scenarios: login flows ===
///
/// ✓ PASS  save new login (6 steps, 2 assertions)
/// ✗ FAIL  update login (6 steps, 2 assertions)
///     [FAIL] Step 5: LastPrompt: last prompt is not updatePassword (actual: savePassword)
///
/// Assertions: 1/4 failed (LastPrompt x1); 0 stopped by step errors
///
/// === Results: 1 passed, 1 failed (2 total) ===
/// ```
pub fn format_console_report(report: &SuiteReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== Scenarios: {} ===\n\n", report.suite_name));

    for result in &report.results {
        let marker = if result.passed {
            "\u{2713} PASS"
        } else {
            "\u{2717} FAIL"
        };

        out.push_str(&format!(
            "{}  {} ({} steps, {} assertions)\n",
            marker,
            result.scenario_name,
            result.steps_run,
            result.assertion_results.len()
        ));

        if let Some(ref error) = result.error {
            out.push_str(&format!("    [ERROR] {}\n", error));
        }

        for ar in result.failed_assertions() {
            let detail = ar.message.as_deref().unwrap_or("assertion failed");
            let actual = ar.actual.as_deref().unwrap_or("none");
            out.push_str(&format!(
                "    [FAIL] Step {}: {}: {} (actual: {})\n",
                ar.step_index,
                ar.assertion.name(),
                detail,
                actual
            ));
        }
    }

    if report.assertions_failed > 0 || report.errored > 0 {
        let kinds: Vec<String> = report
            .failures_by_assertion
            .iter()
            .map(|(kind, count)| format!("{} x{}", kind, count))
            .collect();
        out.push_str(&format!(
            "\nAssertions: {}/{} failed",
            report.assertions_failed, report.assertions_total
        ));
        if !kinds.is_empty() {
            out.push_str(&format!(" ({})", kinds.join(", ")));
        }
        out.push_str(&format!("; {} stopped by step errors\n", report.errored));
    }

    out.push_str(&format!(
        "\n=== Results: {} passed, {} failed ({} total)",
        report.passed, report.failed, report.total
    ));

    if let Some(ms) = report.duration_ms {
        out.push_str(&format!(" in {:.1}s", ms as f64 / 1000.0));
    }

    out.push_str(" ===\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::scenario_model::{AssertionResult, ScenarioAssertion, ScenarioResult};

    #[test]
    fn failed_assertion_lists_actual_value() {
        let failing = ScenarioResult {
            scenario_name: "update login".into(),
            passed: false,
            steps_run: 6,
            assertion_results: vec![AssertionResult {
                step_index: 5,
                assertion: ScenarioAssertion::LastPrompt {
                    expected: "updatePassword".into(),
                },
                passed: false,
                actual: Some("savePassword".into()),
                message: Some("last prompt is not updatePassword".into()),
            }],
            error: None,
        };
        let report = SuiteReport::from_results("login flows", vec![failing]).with_duration(1500);
        let text = format_console_report(&report);
        assert!(text.contains("\u{2717} FAIL  update login (6 steps, 1 assertions)"));
        assert!(text.contains("[FAIL] Step 5: LastPrompt"));
        assert!(text.contains("(actual: savePassword)"));
        assert!(text.contains("Assertions: 1/1 failed (LastPrompt x1); 0 stopped by step errors"));
        assert!(text.ends_with("0 passed, 1 failed (1 total) in 1.5s ===\n"));
    }
}
