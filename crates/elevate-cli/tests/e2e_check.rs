//! E2E tests for `elevate check` and `elevate info`.
//!
//! Commands resolve through the sandbox's `bin/` directory; group
//! membership comes from `--member-of`.

mod common;

use common::Sandbox;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::path::PathBuf;

struct Fixture {
    sandbox: Sandbox,
    policy: PathBuf,
}

fn fixture() -> Fixture {
    let sandbox = Sandbox::new();
    let build = sandbox.command("build.exe");
    let deploy = sandbox.command("deploy.exe");
    let doc = serde_json::json!({
        "schema": "urn:elevate:policy:v1",
        "privilegesGroup": "Administrators",
        "loggingLevel": "both",
        "allowAllCommands": false,
        "invalidLogons": 3,
        "users": [
            {
                "name": "HOST\\alice",
                "loggingLevel": "failure",
                "commands": [
                    { "path": build.to_str().unwrap(), "argumentString": "/^--release$/" },
                    {
                        "path": deploy.to_str().unwrap(),
                        "startTime": "08:00:00",
                        "endTime": "18:00:00"
                    }
                ]
            }
        ],
        "userGroups": [
            {
                "name": "Builders",
                "privilegesGroup": "Wheel",
                "commands": [ { "path": build.to_str().unwrap() } ]
            }
        ]
    });
    let policy = sandbox.write("policy.json", &doc.to_string());
    Fixture { sandbox, policy }
}

impl Fixture {
    fn cmd(&self) -> assert_cmd::Command {
        self.sandbox.cmd_with_policy(&self.policy)
    }
}

// ─── check ─────────────────────────────────────────────────────────

#[test]
fn listed_user_with_matching_arguments_is_allowed() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "HOST\\alice", "build", "--", "--release"])
        .assert()
        .success()
        .stdout(contains("allowed:"))
        .stdout(contains("build.exe"))
        .stdout(contains("logging: failure"));
}

#[test]
fn extra_arguments_are_denied() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "HOST\\alice", "build", "--", "--release", "--debug"])
        .assert()
        .code(1)
        .stdout(contains("denied: no matching command"));
}

#[test]
fn group_member_is_allowed_through_group() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "--member-of", "Builders", "HOST\\carol", "build"])
        .assert()
        .success()
        .stdout(contains("via Builders"));
}

#[test]
fn unlisted_user_is_denied() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "HOST\\carol", "build"])
        .assert()
        .code(1)
        .stdout(contains("denied: user not in policy"));
}

#[test]
fn shell_builtin_is_never_elevated() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "HOST\\alice", "dir"])
        .assert()
        .code(1)
        .stdout(contains("denied: shell built-in"));
}

#[test]
fn unknown_command_is_invalid_path() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "HOST\\alice", "missing"])
        .assert()
        .code(1)
        .stdout(contains("denied: invalid command path"));
}

#[test]
fn time_window_is_applied() {
    let fx = fixture();
    fx.cmd()
        .args(["check", "--at", "09:15", "HOST\\alice", "deploy"])
        .assert()
        .success()
        .stdout(contains("deploy.exe"));
    fx.cmd()
        .args(["check", "--at", "18:00", "HOST\\alice", "deploy"])
        .assert()
        .code(1)
        .stdout(contains("denied: outside time window"));
}

#[test]
fn unreadable_policy_fails_closed() {
    let sandbox = Sandbox::new();
    sandbox.command("build.exe");
    let missing = sandbox.path().join("nope.json");
    sandbox
        .cmd_with_policy(&missing)
        .args(["check", "HOST\\alice", "build"])
        .assert()
        .failure()
        .stdout(contains("allowed").not())
        .stderr(contains("Authorization policy unavailable"));
}

// ─── info ──────────────────────────────────────────────────────────

#[test]
fn info_shows_resolved_settings() {
    let fx = fixture();
    fx.cmd()
        .args(["info", "HOST\\alice"])
        .assert()
        .success()
        .stdout(contains("Administrators"))
        .stdout(contains("failure"))
        .stdout(contains("invalid logons:               3"));
}

#[test]
fn info_through_group_uses_group_settings() {
    let fx = fixture();
    fx.cmd()
        .args(["info", "--member-of", "builders", "HOST\\carol"])
        .assert()
        .success()
        .stdout(contains("Builders"))
        .stdout(contains("Wheel"));
}

#[test]
fn info_for_unknown_user() {
    let fx = fixture();
    fx.cmd()
        .args(["info", "HOST\\mallory"])
        .assert()
        .code(1)
        .stdout(contains("not in policy"));
}
