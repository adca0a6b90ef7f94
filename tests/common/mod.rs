#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const JANE: &str = "S-1-5-21-111-222-333-1001";
pub const BOB: &str = "S-1-5-21-111-222-333-1002";
pub const OLD_JANE: &str = "S-1-5-21-999-888-777-1500";
pub const GROUP: &str = "S-1-5-21-111-222-333-513";
pub const UNKNOWN: &str = "S-1-5-21-111-222-333-4040";
pub const SLOW: &str = "S-1-5-21-111-222-333-7777";

/// Isolated working directory with a directory fixture and a set of real files.
pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().to_path_buf();
        let env = Self { _tmp: tmp, root };
        env.write_fixture(&standard_fixture(&env));
        env
    }

    /// Absolute path string for a file under the working directory.
    pub fn file(&self, name: &str) -> String {
        self.root.join("data").join(name).to_string_lossy().into_owned()
    }

    pub fn touch(&self, name: &str) -> String {
        let path = self.root.join("data").join(name);
        fs::create_dir_all(path.parent().expect("data dir")).expect("create data dir");
        fs::write(&path, name).expect("write data file");
        path.to_string_lossy().into_owned()
    }

    pub fn write_fixture(&self, fixture: &Value) {
        fs::write(
            self.root.join("fixture.json"),
            serde_json::to_string_pretty(fixture).expect("serialize fixture"),
        )
        .expect("write fixture");
    }

    pub fn write_input(&self, paths: &[String]) {
        let mut body = String::from("\u{feff}");
        for p in paths {
            body.push_str(p);
            body.push_str("\r\n");
        }
        body.push('\n');
        fs::write(self.root.join("files.txt"), body).expect("write input list");
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("owner-audit");
        cmd.current_dir(&self.root).env_remove("RUST_LOG");
        cmd
    }

    /// `run` against the fixture backend with extra flags appended.
    pub fn audit(&self, extra: &[&str]) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["run", "--backend", "fixture", "--fixture", "fixture.json"])
            .args(extra);
        cmd
    }

    pub fn audit_json(&self, extra: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .args(["--json", "run", "--backend", "fixture", "--fixture", "fixture.json"])
            .args(extra)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn report(&self) -> String {
        fs::read_to_string(self.root.join("results.csv")).expect("read report")
    }

    /// Report body without BOM and header.
    pub fn report_rows(&self) -> Vec<String> {
        self.report()
            .trim_start_matches('\u{feff}')
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join("ad_cache.json")
    }

    pub fn cache_json(&self) -> Value {
        let raw = fs::read_to_string(self.cache_path()).expect("read cache");
        serde_json::from_str(&raw).expect("cache is json")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

/// Files and directory content shared by most flows:
/// - `a.txt` owned by Jane's identifier
/// - `b.txt` owned by Jane's account name
/// - `bob.txt` owned by Bob
/// - `legacy.txt` owned by Jane's pre-migration identifier
/// - `group.txt` owned by a group
/// - `orphan.txt` owned by an account name that no longer translates
/// - `locked.txt` whose descriptor cannot be read
/// - `stranger.txt` owned by an identifier the directory does not know
/// - `slow.txt` owned by an identifier whose batch times out
pub fn standard_fixture(env: &TestEnv) -> Value {
    let a = env.touch("a.txt");
    let b = env.touch("b.txt");
    let bob = env.touch("bob.txt");
    let legacy = env.touch("legacy.txt");
    let group = env.touch("group.txt");
    let orphan = env.touch("orphan.txt");
    let locked = env.touch("locked.txt");
    let stranger = env.touch("stranger.txt");
    let slow = env.touch("slow.txt");

    json!({
        "owners": {
            a: JANE,
            b: "CONTOSO\\jdoe",
            bob: BOB,
            legacy: OLD_JANE,
            group: GROUP,
            orphan: "CONTOSO\\ghost",
            stranger: UNKNOWN,
            slow: SLOW
        },
        "principals": {"CONTOSO\\jdoe": JANE},
        "objects": {
            JANE: {"name": "Jane Doe", "sAMAccountName": "jdoe", "mail": "jdoe@x.com",
                   "objectClass": ["top", "person", "user"], "enabled": true,
                   "distinguishedName": "CN=Jane Doe,OU=Staff,DC=x,DC=com",
                   "sidHistory": [OLD_JANE]},
            BOB: {"name": "Bob Roe", "sAMAccountName": "broe", "mail": "broe@x.com",
                  "objectClass": ["top", "person", "user"], "enabled": false},
            GROUP: {"name": "Domain Users", "objectClass": ["top", "group"],
                    "distinguishedName": "CN=Domain Users,DC=x,DC=com"}
        },
        "queryErrors": [locked],
        "timeoutSids": [SLOW]
    })
}
