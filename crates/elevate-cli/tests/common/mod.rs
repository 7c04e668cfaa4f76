//! Shared E2E test helpers for `elevate` binary tests.

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Machine name every test runs as.
pub const MACHINE: &str = "HOST";

/// Variables read by the config loader; removed so the developer's
/// environment cannot leak into a test.
const CONFIG_VARS: &[&str] = &[
    "ELEVATE_POLICY_URI",
    "ELEVATE_SCHEMA_URI",
    "ELEVATE_CACHE_FILE",
    "ELEVATE_CACHE_ENABLED",
    "ELEVATE_CACHE_USE_AS_PRIMARY",
    "ELEVATE_CACHE_USE_STALE",
    "ELEVATE_CACHE_UPDATE_FREQUENCY",
    "ELEVATE_REVOKE_STRATEGY",
    "ELEVATE_REVOKE_DELAY",
    "ELEVATE_CREDENTIALS_CACHE",
    "ELEVATE_LOG_FILE",
    "ELEVATE_AUDIT_FILE",
    "RUST_LOG",
];

/// A scratch directory with a `bin/` search path for commands.
pub struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir(dir.path().join("bin")).expect("create bin dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `body` to `name` inside the sandbox.
    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).expect("write sandbox file");
        path
    }

    /// Creates an empty command file in `bin/` and returns its path.
    pub fn command(&self, file_name: &str) -> PathBuf {
        let path = self.dir.path().join("bin").join(file_name);
        std::fs::write(&path, b"MZ").expect("write command file");
        path
    }

    /// `elevate` isolated from the global config and the environment,
    /// with `bin/` as its only search path.
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd: assert_cmd::Command = cargo_bin_cmd!("elevate");
        cmd.timeout(TIMEOUT_BASIC);
        for var in CONFIG_VARS {
            cmd.env_remove(var);
        }
        cmd.env("ELEVATE_CONFIG", self.dir.path().join("absent.toml"));
        cmd.env("PATH", self.dir.path().join("bin"));
        cmd.args(["--machine", MACHINE]);
        cmd
    }

    /// Like [`cmd`](Self::cmd) with `--policy <path> --no-cache`.
    pub fn cmd_with_policy(&self, policy: &Path) -> assert_cmd::Command {
        let mut cmd = self.cmd();
        cmd.arg("--policy").arg(policy).arg("--no-cache");
        cmd
    }
}
