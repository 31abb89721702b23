//! End-to-end runs of the `claims` binary against a pre-seeded cache.

mod common;

use common::{Workspace, JOB};

#[test]
fn help_lists_commands() {
    let workspace = Workspace::new();
    let help = workspace.stdout(&["--help"]);
    for command in ["show-failed", "show-claimable", "claim", "stats", "clean-cache"] {
        assert!(help.contains(command), "missing {command} in help:\n{help}");
    }
}

#[test]
fn show_failed_and_unclaimed_use_cached_report() {
    let workspace = Workspace::new();

    let failed = workspace.stdout(&["show-failed"]);
    assert!(failed.starts_with("failed test name\n"));
    assert!(failed.contains("tests.foreman.api.test_organization.OrganizationTestCase.test_positive_create"));
    assert!(failed.contains("tests.foreman.ui.test_host.HostTestCase.test_positive_search"));
    assert!(!failed.contains("test_positive_update"));

    let unclaimed = workspace.stdout(&["show-unclaimed", "--output", "csv"]);
    assert_eq!(
        unclaimed,
        "unclaimed test name\r\n\
         tests.foreman.api.test_organization.OrganizationTestCase.test_positive_create\r\n\
         tests.foreman.cli.test_subscription.SubscriptionTestCase.test_positive_refresh\r\n"
    );

    let claimed = workspace.stdout(&["show-claimed", "--output", "csv"]);
    assert_eq!(
        claimed,
        "claimed test name,claim reason\r\n\
         tests.foreman.ui.test_host.HostTestCase.test_positive_search,BZ 42: flaky locator\r\n"
    );
}

#[test]
fn show_claimable_matches_production_log_slice() {
    let workspace = Workspace::new();
    let claimable = workspace.stdout(&["show-claimable", "--output", "csv"]);
    let base = format!("http://127.0.0.1:9/job/{JOB}/lastCompletedBuild/testReport/junit");
    assert_eq!(
        claimable,
        format!(
            "claimable test name,claim reason,url\r\n\
             tests.foreman.api.test_organization.OrganizationTestCase.test_positive_create,\
             BZ 1580437: candlepin outage,\
             {base}/tests.foreman.api.test_organization/OrganizationTestCase/test_positive_create\r\n\
             tests.foreman.cli.test_subscription.SubscriptionTestCase.test_positive_refresh,\
             manifest refresh timeout,\
             {base}/tests.foreman.cli.test_subscription/SubscriptionTestCase/test_positive_refresh\r\n"
        )
    );
}

#[test]
fn grep_options_narrow_results_and_rules() {
    let workspace = Workspace::new();
    let claimable = workspace.stdout(&[
        "show-claimable",
        "--grep-rules",
        "^manifest",
        "--output",
        "csv",
    ]);
    assert!(claimable.contains("manifest refresh timeout"));
    assert!(!claimable.contains("candlepin"));

    let claimable = workspace.stdout(&["show-claimable", "--grep-results", r"\.api\."]);
    assert!(claimable.contains("test_positive_create"));
    assert!(!claimable.contains("test_positive_refresh"));
}

#[test]
fn dry_run_claim_reports_without_network() {
    let workspace = Workspace::new();
    let claims = workspace.stdout(&["claim", "--dry-run", "--output", "csv"]);
    assert_eq!(claims.lines().count(), 3, "unexpected output:\n{claims}");
}

#[test]
fn show_prints_stored_fields() {
    let workspace = Workspace::new();
    let shown = workspace.stdout(&["show", "SubscriptionTestCase", "--output", "csv"]);
    assert!(shown.starts_with("field,value\r\n"));
    assert!(shown.contains("status,REGRESSION\r\n"));
    assert!(shown.contains("tier,1\r\n"));
    assert!(shown.contains("distro,7\r\n"));
}

#[test]
fn stats_prints_every_section() {
    let workspace = Workspace::new();
    let stats = workspace.stdout(&["stats", "--output", "csv"]);
    assert!(stats.starts_with("Overall stats\n"));
    assert!(stats.contains("4,3,75,1,33\r\n"), "overall row missing:\n{stats}");
    assert!(stats.contains("t1,4,3,75,1,33\r\n"));
    assert!(stats.contains("UNKNOWN,2,False\r\n"));
    assert!(stats.contains("BZ 1580437: candlepin outage,0,True\r\n"));
    assert!(stats.contains("ui,1,1,1.000\r\n"));
}

#[test]
fn malformed_knowledge_base_fails_the_command() {
    let workspace = Workspace::new();
    std::fs::write(workspace.path().join("kb.json"), r#"[{"reason": "x", "XOR": []}]"#)
        .expect("write kb");
    let output = workspace.run(&["show-claimable"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not formatted correctly"), "stderr: {stderr}");
}

#[test]
fn clean_cache_removes_job_group_directory() {
    let workspace = Workspace::new();
    assert!(workspace.cache_dir().is_dir());
    workspace.stdout(&["clean-cache"]);
    assert!(!workspace.cache_dir().exists());
}
