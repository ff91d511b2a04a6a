use clap::Parser;
use form_autofill::cli::commands::{cmd_classify, cmd_run};
use form_autofill::cli::config::{AutofillConfig, Cli, Commands, load_config_strict};
use form_autofill::error::AutofillError;

// ============================================================================
// CLI Argument Parsing Tests
// ============================================================================

#[test]
fn cli_parse_classify() {
    let cli = Cli::parse_from([
        "form-autofill",
        "classify",
        "--fields",
        "snapshot.json",
        "--url",
        "https://example.com/login",
    ]);
    match cli.command {
        Commands::Classify { fields, url } => {
            assert_eq!(fields, "snapshot.json");
            assert_eq!(url.as_deref(), Some("https://example.com/login"));
        }
        _ => panic!("Expected Classify command"),
    }
    assert_eq!(cli.verbose, 0);
    assert!(cli.config.is_none());
}

#[test]
fn cli_parse_run_defaults() {
    let cli = Cli::parse_from(["form-autofill", "run", "--scenario", "scenarios/"]);
    match cli.command {
        Commands::Run {
            scenario,
            format,
            output,
            trace,
        } => {
            assert_eq!(scenario, "scenarios/");
            assert_eq!(format, "console");
            assert!(output.is_none());
            assert!(trace.is_none());
        }
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn cli_parse_run_all_args_and_globals() {
    let cli = Cli::parse_from([
        "form-autofill",
        "run",
        "--scenario",
        "login.yaml",
        "--format",
        "json",
        "-o",
        "out.json",
        "--trace",
        "trace.jsonl",
        "-vv",
        "--config",
        "custom.yaml",
    ]);
    match cli.command {
        Commands::Run {
            format,
            output,
            trace,
            ..
        } => {
            assert_eq!(format, "json");
            assert_eq!(output.as_deref(), Some("out.json"));
            assert_eq!(trace.as_deref(), Some("trace.jsonl"));
        }
        _ => panic!("Expected Run command"),
    }
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
}

#[test]
fn cli_rejects_missing_required_args() {
    assert!(Cli::try_parse_from(["form-autofill", "classify"]).is_err());
    assert!(Cli::try_parse_from(["form-autofill", "run"]).is_err());
}

// ============================================================================
// classify
// ============================================================================

#[test]
fn classify_reports_groups_and_roles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");
    std::fs::write(
        &path,
        r#"[
            {"beamId": "u", "type": "text", "autocomplete": "username"},
            {"beamId": "p", "type": "password"},
            {"beamId": "q", "type": "text", "inputmode": "search"}
        ]"#,
    )
    .unwrap();

    let json = cmd_classify(
        path.to_str().unwrap(),
        Some("https://www.example.com/login"),
        &AutofillConfig::default(),
    )
    .unwrap();
    let report: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(report["host"], "example.com");
    assert_eq!(report["groups"].as_array().unwrap().len(), 1);
    assert_eq!(report["groups"][0]["action"], "login");
    assert_eq!(report["groups"][0]["isAmbiguous"], false);
    assert_eq!(report["roles"]["u"], "currentUsername");
    assert_eq!(report["roles"]["p"], "currentPassword");
}

#[test]
fn classify_without_url_has_no_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");
    std::fs::write(&path, r#"[{"beamId": "e", "type": "email"}]"#).unwrap();

    let json = cmd_classify(path.to_str().unwrap(), None, &AutofillConfig::default()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(report["host"].is_null());
    assert_eq!(report["groups"][0]["action"], "personalInfo");
}

#[test]
fn classify_surfaces_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fields.json");
    std::fs::write(&path, "{not an array").unwrap();

    let config = AutofillConfig::default();
    assert!(matches!(
        cmd_classify(path.to_str().unwrap(), None, &config),
        Err(AutofillError::Json(_))
    ));
    assert!(matches!(
        cmd_classify(dir.path().join("missing.json").to_str().unwrap(), None, &config),
        Err(AutofillError::Io(_))
    ));
}

// ============================================================================
// run
// ============================================================================

const FAILING_SCENARIO: &str = r#"
name: expects two prompts
url: https://example.com/login
steps:
  - action: fields
    fields:
      - beamId: u
        type: text
        autocomplete: username
      - beamId: p
        type: password
  - action: type
    id: u
    value: bob
  - action: type
    id: p
    value: secret
  - action: submit
    id: p
  - action: assert
    assertions:
      - type: prompt_count
        expected: 2
"#;

#[tokio::test]
async fn run_writes_json_report_and_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("login.yaml");
    let output = dir.path().join("report.json");
    std::fs::write(&scenario, FAILING_SCENARIO).unwrap();

    let all_passed = cmd_run(
        scenario.to_str().unwrap(),
        "json",
        output.to_str(),
        None,
        &AutofillConfig::default(),
        0,
    )
    .await
    .unwrap();
    assert!(!all_passed);

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["total"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["results"][0]["scenario_name"], "expects two prompts");
    assert_eq!(report["results"][0]["assertion_results"][0]["actual"], "1");
    assert_eq!(report["errored"], 0);
    assert_eq!(report["assertions_failed"], 1);
    assert_eq!(report["failures_by_assertion"]["PromptCount"], 1);
}

#[tokio::test]
async fn run_console_report_marks_failures() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("login.yaml");
    let output = dir.path().join("report.txt");
    std::fs::write(&scenario, FAILING_SCENARIO).unwrap();

    let all_passed = cmd_run(
        scenario.to_str().unwrap(),
        "console",
        output.to_str(),
        None,
        &AutofillConfig::default(),
        0,
    )
    .await
    .unwrap();
    assert!(!all_passed);

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.contains("FAIL  expects two prompts"));
    assert!(text.contains("PromptCount"));
    assert!(text.contains("Assertions: 1/1 failed (PromptCount x1)"));
}

#[tokio::test]
async fn run_rejects_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("login.yaml");
    std::fs::write(&scenario, FAILING_SCENARIO).unwrap();

    let result = cmd_run(
        scenario.to_str().unwrap(),
        "html",
        None,
        None,
        &AutofillConfig::default(),
        0,
    )
    .await;
    assert!(matches!(result, Err(AutofillError::Config(_))));
}

#[tokio::test]
async fn run_on_empty_directory_passes() {
    let dir = tempfile::tempdir().unwrap();
    let passed = cmd_run(
        dir.path().to_str().unwrap(),
        "json",
        None,
        None,
        &AutofillConfig::default(),
        0,
    )
    .await
    .unwrap();
    assert!(passed);
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn strict_config_loads_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("form-autofill.yaml");
    std::fs::write(
        &path,
        "timing:\n  submit_grace_ms: 800\nappearance:\n  highlight_color: \"#ffe\"\n",
    )
    .unwrap();

    let config = load_config_strict(path.to_str().unwrap()).unwrap();
    assert_eq!(config.timing.submit_grace_ms, 800);
    assert_eq!(config.timing.focus_debounce_ms, 100);
    assert_eq!(config.appearance.highlight_color, "#ffe");
}

#[test]
fn strict_config_rejects_bad_color() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("form-autofill.yaml");
    std::fs::write(&path, "appearance:\n  highlight_color: \"#12345\"\n").unwrap();

    assert!(matches!(
        load_config_strict(path.to_str().unwrap()),
        Err(AutofillError::Config(_))
    ));
}
