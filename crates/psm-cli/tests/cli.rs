use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use rusqlite::Connection;
use serde_json::Value;

const TEST_USER: &str = "psm-cli-tester";
const CONTACTS: &str = "kTCCServiceAddressBook";

fn psm(root: &Path, darwin: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("psm");
    cmd.env("PSM_ROOT", root)
        .env("PSM_DARWIN_VERSION", darwin)
        .env("NO_COLOR", "1")
        .env_remove("PSM_LOG")
        .env_remove("PSM_LOG_DEST");
    cmd
}

fn user_home(root: &Path) -> PathBuf {
    let home = root.join("Users").join(TEST_USER);
    fs::create_dir_all(&home).expect("home dir");
    home
}

fn user_store(root: &Path) -> PathBuf {
    root.join("Users")
        .join(TEST_USER)
        .join("Library/Application Support/com.apple.TCC/TCC.db")
}

fn json_output(cmd: &mut Command) -> (i32, Value) {
    let output = cmd.output().expect("run psm");
    let code = output.status.code().expect("exit code");
    let payload = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    });
    (code, payload)
}

fn rows(store: &Path, client: &str) -> Vec<(bool, i64)> {
    let conn = Connection::open(store).expect("open store");
    let mut stmt = conn
        .prepare("SELECT allowed, prompt_count FROM access WHERE service = ?1 AND client = ?2")
        .expect("prepare");
    stmt.query_map([CONTACTS, client], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

#[test]
fn help_lists_actions_and_services() {
    let assert = cargo_bin_cmd!("psm").arg("--help").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    for needle in ["add / enable", "disable", "location", "--template", "--forceroot"] {
        assert!(stdout.contains(needle), "help is missing {needle}: {stdout}");
    }
}

#[test]
fn services_reports_availability_for_the_host() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (code, payload) = json_output(psm(temp.path(), "12").args(["services", "--json"]));

    assert_eq!(code, 0);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["darwin"], 12);
    let services = payload["details"]["services"].as_array().expect("services");
    assert_eq!(services.len(), 6);
    let calendar = services
        .iter()
        .find(|entry| entry["key"] == "calendar")
        .expect("calendar entry");
    assert_eq!(calendar["available"], false);
}

#[test]
fn services_prints_a_table_for_humans() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = psm(temp.path(), "13").arg("services").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.starts_with("✔ psm services: 6 of 6 services available on Darwin 13"));
    assert!(stdout.contains("kTCCServiceAddressBook"));
}

#[test]
fn add_disable_remove_round_trip_on_a_user_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    user_home(root);
    let app = "/Applications/Tool.app";
    let store = user_store(root);

    psm(root, "13")
        .args(["add", "contacts", app, "--admin", "--user", TEST_USER])
        .assert()
        .success();
    assert!(store.is_file(), "store created at {}", store.display());
    assert_eq!(rows(&store, app), vec![(true, 1)]);

    let (code, payload) = json_output(psm(root, "13").args([
        "disable", "contacts", app, "--admin", "--user", TEST_USER, "--json",
    ]));
    assert_eq!(code, 0);
    assert_eq!(payload["details"]["clients"][0], app);
    assert_eq!(rows(&store, app), vec![(false, 1)]);

    psm(root, "13")
        .args(["remove", "contacts", app, "--admin", "--user", TEST_USER])
        .assert()
        .success();
    assert!(rows(&store, app).is_empty());
}

#[test]
fn legacy_hosts_get_the_five_column_layout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    user_home(root);
    let app = "/Applications/Legacy.app";

    psm(root, "12")
        .args(["enable", "contacts", app, "--admin", "-u", TEST_USER])
        .assert()
        .success();

    let conn = Connection::open(user_store(root)).expect("open store");
    let columns: Vec<String> = conn
        .prepare("SELECT name FROM pragma_table_info('access')")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("columns");
    assert!(!columns.iter().any(|name| name == "csreq"));
    assert_eq!(rows(&user_store(root), app), vec![(true, 1)]);
}

#[test]
fn unknown_service_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = psm(temp.path(), "13")
        .args(["add", "camera", "Safari"])
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("PSM101"), "stdout: {stdout}");
    assert!(stdout.contains("camera"));
}

#[test]
fn json_envelope_carries_error_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let (code, payload) = json_output(psm(root, "13").args(["add", "contacts", "--json"]));
    assert_eq!(code, 1);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["code"], "PSM104");

    let (code, payload) = json_output(psm(root, "12").args([
        "add",
        "calendar",
        "/Applications/Tool.app",
        "--admin",
        "--json",
    ]));
    assert_eq!(code, 1);
    assert_eq!(payload["details"]["code"], "PSM102");
    assert!(payload["message"]
        .as_str()
        .expect("message")
        .starts_with("psm add calendar:"));
}

#[test]
fn missing_user_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (code, payload) = json_output(psm(temp.path(), "13").args([
        "add",
        "contacts",
        "/Applications/Tool.app",
        "--admin",
        "--user",
        "psm-no-such-account",
        "--json",
    ]));
    assert_eq!(code, 1);
    assert_eq!(payload["details"]["code"], "PSM301");
    assert_eq!(payload["details"]["reason"], "invalid_user");
}

#[test]
fn quiet_mode_only_reports_failures() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    user_home(root);

    let assert = psm(root, "13")
        .args([
            "-q",
            "add",
            "contacts",
            "/Applications/Tool.app",
            "--admin",
            "--user",
            TEST_USER,
        ])
        .assert()
        .success();
    assert!(assert.get_output().stdout.is_empty());

    let assert = psm(root, "13")
        .args(["-q", "add", "camera", "Safari"])
        .assert()
        .code(1);
    assert!(assert.get_output().stdout.is_empty());
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("PSM101"));
}

#[test]
fn log_destination_receives_log_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    user_home(root);
    let log = root.join("logs/psm.log");

    psm(root, "13")
        .args(["add", "contacts", "/Applications/Tool.app", "--admin", "-u", TEST_USER])
        .arg("--log-dest")
        .arg(&log)
        .assert()
        .success();
    let text = fs::read_to_string(&log).expect("log file");
    assert!(!text.is_empty());
    assert!(!text.contains('\u{1b}'), "file logs carry no ANSI codes");
}
