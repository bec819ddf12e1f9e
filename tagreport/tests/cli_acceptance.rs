use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("reports")
    }

    fn reports(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.output_dir())
            .expect("report directory should exist")
            .map(|entry| {
                entry
                    .expect("failed to read report entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

fn fixture_snapshot() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../tagreport-core/tests/fixtures/snapshot.json")
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("tagreport"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute tagreport: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "tagreport {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn assert_failure_mentions(output: &Output, needle: &str) {
    assert!(!output.status.success(), "expected tagreport to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(needle),
        "expected stderr to mention {needle:?}, got:\n{stderr}"
    );
}

#[test]
fn report_from_snapshot_writes_all_time_csv() {
    let env = CliTestEnv::new();
    let snapshot = fixture_snapshot();
    let output_dir = env.output_dir();
    let args = [
        "--no-api",
        "--snapshot",
        snapshot.to_str().unwrap(),
        "--output-dir",
        output_dir.to_str().unwrap(),
    ];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tag report (all time)"), "stdout:\n{stdout}");
    assert!(stdout.contains("Report written to"));
    // malformed question, orphan answer, unknown webhook tag
    assert!(stdout.contains("Records skipped:    3"), "stdout:\n{stdout}");

    let reports = env.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].ends_with("_tag_metrics.csv"), "got {reports:?}");

    let content = fs::read_to_string(output_dir.join(&reports[0])).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with("tag_name,question_count,answer_count"));
    assert!(lines[1].starts_with("python,2,1,"));
    assert_eq!(lines.len(), 4);
}

#[test]
fn report_with_days_names_the_window() {
    let env = CliTestEnv::new();
    let snapshot = fixture_snapshot();
    let output_dir = env.output_dir();
    let args = [
        "--no-api",
        "--snapshot",
        snapshot.to_str().unwrap(),
        "--output-dir",
        output_dir.to_str().unwrap(),
        "--days",
        "30",
    ];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tag report (past 30 days)"), "stdout:\n{stdout}");
    assert!(stdout.contains("Since:"), "stdout:\n{stdout}");

    let reports = env.reports();
    assert_eq!(reports.len(), 1);
    assert!(
        reports[0].ends_with("_tag_metrics_past_30_days.csv"),
        "got {reports:?}"
    );
}

#[test]
fn non_positive_days_is_rejected() {
    let env = CliTestEnv::new();
    let snapshot = fixture_snapshot();

    for days in ["0", "-5"] {
        let output = run_bin(
            &env,
            &["--no-api", "--snapshot", snapshot.to_str().unwrap(), "--days", days],
        );
        assert_failure_mentions(&output, "invalid --days value");
    }
    assert!(!env.output_dir().exists(), "no report should be written");
}

#[test]
fn missing_snapshot_points_at_harvesting() {
    let env = CliTestEnv::new();
    let missing = env.temp_dir.path().join("absent.json");

    let output = run_bin(&env, &["--no-api", "--snapshot", missing.to_str().unwrap()]);
    assert_failure_mentions(&output, "snapshot not found");
}

#[test]
fn harvesting_without_url_fails() {
    let env = CliTestEnv::new();
    let output_dir = env.output_dir();

    let output = run_bin(&env, &["--output-dir", output_dir.to_str().unwrap()]);
    assert_failure_mentions(&output, "--url");
    assert!(!output_dir.exists());
}

#[test]
fn no_api_conflicts_with_credentials() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["--no-api", "--url", "https://example.stackenterprise.co"]);
    assert_failure_mentions(&output, "cannot be used with");
}
