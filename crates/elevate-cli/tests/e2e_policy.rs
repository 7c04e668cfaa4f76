//! E2E tests for policy maintenance: `validate`, `import-csv`, `update`,
//! and config layering.

mod common;

use common::Sandbox;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

const POLICY_JSON: &str = r#"{
    "schema": "urn:elevate:policy:v1",
    "privilegesGroup": "Administrators",
    "users": [ { "name": "HOST\\alice", "allowAllCommands": true } ],
    "commandGroups": [ { "name": "tools", "commands": [ { "path": "c:\\tools\\x.exe" } ] } ]
}"#;

const POLICY_TOML: &str = r#"
schema = "urn:elevate:policy:v1"
privilegesGroup = "Administrators"

[[users]]
name = 'HOST\alice'
allowAllCommands = true

[[userGroups]]
name = "Admins"
"#;

const FEED: &str = "system,username,path,checksum,arguments\n\
HOST,CORP\\bob,*,,\n\
host,CORP\\alice,c:\\tools\\build.exe,,--release\n\
OTHER,CORP\\eve,c:\\tools\\build.exe,,\n";

// ─── validate ──────────────────────────────────────────────────────

#[test]
fn validate_json() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("policy.json", POLICY_JSON);
    sandbox
        .cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("valid (1 users, 0 user groups, 1 command groups)"));
}

#[test]
fn validate_toml() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("policy.toml", POLICY_TOML);
    sandbox
        .cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("valid (1 users, 1 user groups, 0 command groups)"));
}

#[test]
fn validate_csv_feed_for_machine() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("feed.csv", FEED);
    sandbox
        .cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("0 users, 1 user groups"));
}

#[test]
fn validate_rejects_unknown_field() {
    let sandbox = Sandbox::new();
    let path = sandbox.write(
        "policy.json",
        r#"{ "schema": "urn:elevate:policy:v1", "colour": "blue" }"#,
    );
    sandbox
        .cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(contains("valid").not())
        .stderr(contains("colour"));
}

#[test]
fn validate_rejects_wrong_schema() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("policy.json", r#"{ "schema": "urn:other:v9" }"#);
    sandbox
        .cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("urn:other:v9"));
}

// ─── import-csv ────────────────────────────────────────────────────

#[test]
fn import_csv_to_stdout() {
    let sandbox = Sandbox::new();
    let path = sandbox.write("feed.csv", FEED);
    let output = sandbox
        .cmd()
        .arg("import-csv")
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["schema"], "urn:elevate:policy:v1");
    assert_eq!(doc["privilegesGroup"], "Administrators");
    let group = &doc["userGroups"][0];
    assert_eq!(group["name"], "sudoers");
    let users = group["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["name"], "CORP\\alice");
    assert_eq!(users[1]["allowAllCommands"], true);
}

#[test]
fn import_csv_output_validates() {
    let sandbox = Sandbox::new();
    let feed = sandbox.write("feed.csv", FEED);
    let out = sandbox.path().join("policy.json");
    sandbox
        .cmd()
        .arg("import-csv")
        .arg(&feed)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stderr(contains("wrote"));

    sandbox
        .cmd()
        .arg("validate")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("1 user groups"));
}

#[test]
fn import_csv_reports_missing_column() {
    let sandbox = Sandbox::new();
    let feed = sandbox.write("feed.csv", "system,username,path\nHOST,bob,*\n");
    sandbox
        .cmd()
        .arg("import-csv")
        .arg(&feed)
        .assert()
        .failure()
        .stderr(contains("checksum"));
}

// ─── update ────────────────────────────────────────────────────────

#[test]
fn update_from_primary_without_cache() {
    let sandbox = Sandbox::new();
    let policy = sandbox.write("policy.json", POLICY_JSON);
    sandbox
        .cmd_with_policy(&policy)
        .arg("update")
        .assert()
        .success()
        .stdout(contains("policy loaded from primary: 1 users"))
        .stdout(contains("cache").not());
}

#[test]
fn forced_update_writes_cache_then_cache_serves() {
    let sandbox = Sandbox::new();
    let policy = sandbox.write("policy.json", POLICY_JSON);
    let cache = sandbox.path().join("cache.json");

    sandbox
        .cmd()
        .env("ELEVATE_CACHE_FILE", &cache)
        .arg("--policy")
        .arg(&policy)
        .args(["update", "--force"])
        .assert()
        .success()
        .stdout(contains("policy loaded from primary"))
        .stdout(contains("Fresh"));
    assert!(cache.is_file());

    std::fs::remove_file(&policy).unwrap();
    sandbox
        .cmd()
        .env("ELEVATE_CACHE_FILE", &cache)
        .env("ELEVATE_CACHE_USE_AS_PRIMARY", "true")
        .arg("--policy")
        .arg(&policy)
        .arg("update")
        .assert()
        .success()
        .stdout(contains("policy loaded from cache: 1 users"));
}

#[test]
fn update_with_missing_primary_fails() {
    let sandbox = Sandbox::new();
    let missing = sandbox.path().join("missing.json");
    sandbox
        .cmd_with_policy(&missing)
        .arg("update")
        .assert()
        .failure()
        .stdout(contains("policy loaded").not());
}

// ─── configuration ─────────────────────────────────────────────────

#[test]
fn config_file_supplies_policy_location() {
    let sandbox = Sandbox::new();
    let policy = sandbox.write("policy.toml", POLICY_TOML);
    let config = sandbox.write(
        "config.toml",
        &format!(
            "[policy]\nprimary_source_uri = '{}'\ncache_enabled = false\n",
            policy.display()
        ),
    );
    sandbox
        .cmd()
        .arg("--config")
        .arg(&config)
        .arg("update")
        .assert()
        .success()
        .stdout(contains("policy loaded from primary: 1 users, 1 user groups"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("--config")
        .arg(sandbox.path().join("nope.toml"))
        .arg("update")
        .assert()
        .failure()
        .stderr(contains("config error"));
}

#[test]
fn env_var_overrides_config_file() {
    let sandbox = Sandbox::new();
    let policy = sandbox.write("policy.json", POLICY_JSON);
    let config = sandbox.write(
        "config.toml",
        "[policy]\nprimary_source_uri = '/nonexistent/policy.json'\ncache_enabled = false\n",
    );
    sandbox
        .cmd()
        .env("ELEVATE_POLICY_URI", &policy)
        .arg("--config")
        .arg(&config)
        .arg("update")
        .assert()
        .success()
        .stdout(contains("policy loaded from primary"));
}

#[test]
fn file_logging_writes_log() {
    let sandbox = Sandbox::new();
    let policy = sandbox.write("policy.json", POLICY_JSON);
    let log = sandbox.path().join("logs").join("elevate.log");
    sandbox
        .cmd_with_policy(&policy)
        .arg("--log-file")
        .arg(&log)
        .args(["--log-level", "debug", "update"])
        .assert()
        .success();

    let body = std::fs::read_to_string(&log).unwrap();
    assert!(body.contains("File logging enabled"), "log was: {body}");
    assert!(!body.contains('\u{1b}'), "log has ANSI escapes");
}
