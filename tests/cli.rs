use rusqlite::Connection;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const JAN_1_2024: i64 = 1_704_067_200;

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_billing-usage")
}

fn command(home: &TempDir, args: &[&str]) -> Command {
    let mut cmd = Command::new(bin_path());
    cmd.args(args)
        .env("BILLING_USAGE_HOME", home.path())
        .env_remove("BILLING_USAGE__FLAGS__USAGEV2")
        .env_remove("RUST_LOG");
    cmd
}

fn run_cmd(home: &TempDir, args: &[&str]) -> Output {
    command(home, args).output().expect("run billing-usage command")
}

fn db_path(home: &TempDir) -> PathBuf {
    home.path().join("data").join("usage.sqlite")
}

fn write_subscription(home: &TempDir, tier: &str) -> PathBuf {
    let path = home.path().join(format!("{tier}.json"));
    let body = serde_json::json!({
        "tier": { "prod_id": tier },
        "billing": { "current_period_start": JAN_1_2024 }
    });
    fs::write(&path, body.to_string()).expect("write subscription payload");
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json output")
}

fn seed_usage_row(home: &TempDir, project_ref: &str, date: &str, metric: &str, cost: f64) {
    let conn = Connection::open(db_path(home)).expect("open sqlite");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS daily_usage (
            id INTEGER PRIMARY KEY,
            project_ref TEXT NOT NULL,
            date TEXT NOT NULL,
            metric TEXT NOT NULL,
            usage REAL NOT NULL,
            cost REAL NOT NULL
        );
        "#,
    )
    .expect("create usage table");

    conn.execute(
        "INSERT INTO daily_usage (project_ref, date, metric, usage, cost)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![project_ref, date, metric, 3.0_f64, cost],
    )
    .expect("insert usage row");
}

#[test]
fn init_creates_config_and_data_paths() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["init"]);
    assert!(output.status.success());

    assert!(home.path().join("config").exists());
    assert!(home.path().join("data").exists());
    assert!(home.path().join("config").join("config.toml").exists());
}

#[test]
fn init_is_idempotent() {
    let home = TempDir::new().expect("temp home");

    assert!(run_cmd(&home, &["init"]).status.success());
    let first = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after first init");

    assert!(run_cmd(&home, &["init"]).status.success());
    let second = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after second init");

    assert_eq!(first, second);
}

#[test]
fn presets_list_billing_cycle_first() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["presets"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let keys: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split('\t').next())
        .collect();
    assert_eq!(keys.first(), Some(&"currentBillingCycle"));
    assert!(keys.contains(&"previousBillingCycle"));
    assert!(keys.contains(&"custom"));
}

#[test]
fn resolve_payg_uses_default_billing_window() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_payg");

    let output = run_cmd(
        &home,
        &["resolve", "--project", "abcd", "--subscription-file", path_arg(&sub)],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["project_ref"], "abcd");
    assert_eq!(report["mode"], "payg");
    assert_eq!(report["decision"], "show_payg_detail");
    assert_eq!(report["window"]["source"], "default");
    assert_eq!(report["window"]["start"], "2024-01-01");
    assert_eq!(report["usage_request"]["start"], "2024-01-01");
}

#[test]
fn resolve_payg_with_explicit_range() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_payg");

    let output = run_cmd(
        &home,
        &[
            "resolve",
            "--project",
            "abcd",
            "--subscription-file",
            path_arg(&sub),
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["window"]["source"], "user_selected");
    assert_eq!(report["window"]["end"], "2024-01-31");
    assert_eq!(report["usage_request"]["end"], "2024-01-31");
}

#[test]
fn resolve_other_tiers_show_legacy_aggregate() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_pro");

    let output = run_cmd(
        &home,
        &["resolve", "--project", "abcd", "--subscription-file", path_arg(&sub)],
    );
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["mode"], "legacy_aggregate");
    assert_eq!(report["decision"], "show_legacy_aggregate");
    assert!(report["usage_request"].is_null());
}

#[test]
fn resolve_flag_on_shows_next_gen_until_opted_out() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_payg");

    let output = command(
        &home,
        &["resolve", "--project", "abcd", "--subscription-file", path_arg(&sub)],
    )
    .env("BILLING_USAGE__FLAGS__USAGEV2", "true")
    .output()
    .expect("run resolve");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["flag_enabled"], true);
    assert_eq!(report["decision"], "show_next_gen");

    let output = command(
        &home,
        &[
            "resolve",
            "--project",
            "abcd",
            "--legacy-ui",
            "--subscription-file",
            path_arg(&sub),
        ],
    )
    .env("BILLING_USAGE__FLAGS__USAGEV2", "true")
    .output()
    .expect("run resolve");
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["new_ui"], false);
    assert_eq!(report["decision"], "show_payg_detail");
}

#[test]
fn resolve_rejects_reversed_range() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_payg");

    let output = run_cmd(
        &home,
        &[
            "resolve",
            "--project",
            "abcd",
            "--subscription-file",
            path_arg(&sub),
            "--start",
            "2024-02-01",
            "--end",
            "2024-01-01",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("InvalidRange"));
}

#[test]
fn resolve_reports_subscription_failure_once() {
    let home = TempDir::new().expect("temp home");
    let missing = home.path().join("missing.json");

    let output = run_cmd(
        &home,
        &["resolve", "--project", "abcd", "--subscription-file", path_arg(&missing)],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Failed to get project subscription").count(), 1);
}

#[test]
fn resolve_requires_a_project() {
    let home = TempDir::new().expect("temp home");
    let sub = write_subscription(&home, "prod_payg");

    let output = run_cmd(&home, &["resolve", "--subscription-file", path_arg(&sub)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No project given"));
}

#[test]
fn export_csv_outputs_header_and_escaped_fields() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());
    seed_usage_row(&home, "abcd", "2024-01-02", "egress,\"gb\"", 1.25);

    let output = run_cmd(&home, &["export", "--format", "csv"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("project_ref,date,metric,usage,cost"));
    assert!(stdout.contains("abcd,2024-01-02,\"egress,\"\"gb\"\"\""));
}

#[test]
fn export_json_filters_by_project() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());
    seed_usage_row(&home, "abcd", "2024-01-02", "egress", 2.5);
    seed_usage_row(&home, "wxyz", "2024-01-02", "egress", 0.5);

    let output = run_cmd(&home, &["export", "--format", "json", "--project", "ABCD"]);
    assert!(output.status.success());

    let parsed = stdout_json(&output);
    let arr = parsed.as_array().expect("json array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["project_ref"], "abcd");
    assert_eq!(arr[0]["metric"], "egress");
}

#[test]
fn export_rejects_unknown_format() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());

    let output = run_cmd(&home, &["export", "--format", "xml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unsupported export format"));
}
