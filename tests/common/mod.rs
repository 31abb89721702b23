//! Shared test infrastructure for integration tests.
//!
//! A `Workspace` is a temp directory holding a config, a knowledge base and
//! a pre-seeded cache, so the binary never needs the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const JOB: &str = "automation-6.4-tier1-rhel7";

const CONFIG: &str = r#"url: http://127.0.0.1:9/
usr: robot
pwd: secret
job_groups:
  latest:
    template: "automation-6.4-tier{tier}-rhel{rhel}"
    jobs:
      - { tier: 1, rhel: 7, build: lastCompletedBuild }
"#;

const KB: &str = r#"[
  {
    "reason": "BZ 1580437: candlepin outage",
    "AND": [
      { "field": "className", "pattern": "\\.api\\." },
      { "field": "production.log", "pattern": "Candlepin::Error" }
    ]
  },
  {
    "reason": "manifest refresh timeout",
    "field": "stdout",
    "pattern": "manifest refresh timed out"
  }
]
"#;

const PRODUCTION_LOG: &str = "\
2018-06-13T07:37:25 [I|app|a1] Started POST \"/katello/api/organizations\"
2018-06-13T07:37:31 [E|app|a1] Candlepin::Error: 502 Bad Gateway
  /usr/share/foreman/app/models/organization.rb:12
2018-06-13T07:37:40 [I|app|b2] Completed 200 OK
";

fn report_json() -> String {
    serde_json::json!({
        "suites": [{
            "cases": [
                {
                    "className": "tests.foreman.api.test_organization.OrganizationTestCase",
                    "name": "test_positive_create",
                    "status": "FAILED",
                    "stdout": "2018-06-13 07:37:20 - nailgun.client - DEBUG - POST\n\
                               2018-06-13 07:37:35 - nailgun.client - DEBUG - response 502\n",
                    "testActions": [{}]
                },
                {
                    "className": "tests.foreman.cli.test_subscription.SubscriptionTestCase",
                    "name": "test_positive_refresh",
                    "status": "REGRESSION",
                    "stdout": "2018-06-13 07:40:00 - robottelo - INFO - manifest refresh timed out\n",
                    "testActions": [{}]
                },
                {
                    "className": "tests.foreman.ui.test_host.HostTestCase",
                    "name": "test_positive_search",
                    "status": "ERROR",
                    "stdout": null,
                    "testActions": [{ "reason": "BZ 42: flaky locator" }]
                },
                {
                    "className": "tests.foreman.api.test_host.HostTestCase",
                    "name": "test_positive_update",
                    "status": "PASSED",
                    "stdout": null,
                    "testActions": []
                }
            ]
        }]
    })
    .to_string()
}

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp workspace");
        let root = dir.path();
        fs::write(root.join("config.yaml"), CONFIG).expect("write config");
        fs::write(root.join("kb.json"), KB).expect("write kb");
        let job_dir = root.join(".cache/latest").join(JOB);
        fs::create_dir_all(&job_dir).expect("create cache dir");
        fs::write(job_dir.join("main.json"), report_json()).expect("seed report");
        fs::write(job_dir.join("production.log"), PRODUCTION_LOG).expect("seed log");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join(".cache/latest")
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_claims"))
            .args(args)
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .output()
            .expect("run claims binary")
    }

    /// Run and return stdout, failing the test on a non-zero exit.
    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "claims {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).expect("utf-8 stdout")
    }
}
