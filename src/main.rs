use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use serde_json::Value;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

mod case;
mod claiming;
mod cli;
mod config;
mod error;
mod foreman_debug;
mod jenkins;
mod production_log;
mod report;
mod rules;
mod stats;
mod table;
mod timing;

use claiming::{claim_by_rules, ClaimEvent, ClaimMode};
use cli::{ClaimArgs, Command, GlobalArgs, RootArgs, ShowArgs};
use config::Config;
use jenkins::{JenkinsClaims, JenkinsClient};
use report::Report;
use rules::Rule;
use table::{Cell, Table};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_logging(args.global.debug);
    tracing::debug!(?args, "arguments parsed");

    let config = Config::load(&args.global.config)?;
    match args.command {
        Command::ShowFailed => cmd_show_failed(&config, &args.global),
        Command::ShowClaimed => cmd_show_claimed(&config, &args.global),
        Command::ShowUnclaimed => cmd_show_unclaimed(&config, &args.global),
        Command::ShowClaimable => cmd_show_claimable(&config, &args.global),
        Command::Show(show) => cmd_show(&config, &args.global, &show),
        Command::Claim(claim) => cmd_claim(&config, &args.global, &claim),
        Command::Stats => cmd_stats(&config, &args.global),
        Command::CleanCache => cmd_clean_cache(&config, &args.global),
    }
}

/// Log to stderr; `--debug` wins over `RUST_LOG`, which wins over `info`.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct Session {
    client: Rc<JenkinsClient>,
    report: Report,
}

fn open_session(config: &Config, global: &GlobalArgs) -> Result<Session> {
    let client = Rc::new(JenkinsClient::new(config));
    let mut report = Report::load(config, &client, &global.job_group)
        .with_context(|| format!("load report for job group {}", global.job_group))?;
    if let Some(pattern) = &global.grep_results {
        let grep = compile_grep("--grep-results", pattern)?;
        report.retain_test_names(&grep);
        tracing::debug!(
            job_group = %report.job_group,
            pattern = %pattern,
            kept = report.cases.len(),
            "results filtered"
        );
    }
    Ok(Session { client, report })
}

fn load_kb(global: &GlobalArgs) -> Result<Vec<Rule>> {
    let rules = rules::load_rules(&global.kb)?;
    match &global.grep_rules {
        Some(pattern) => {
            let grep = compile_grep("--grep-rules", pattern)?;
            let rules = rules::filter_rules(rules, &grep);
            tracing::debug!(pattern = %pattern, kept = rules.len(), "rules filtered");
            Ok(rules)
        }
        None => Ok(rules),
    }
}

fn compile_grep(flag: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid {flag} pattern {pattern:?}"))
}

fn print_table(table: &Table, global: &GlobalArgs) {
    print!("{}", table.render(global.output));
}

fn cmd_show_failed(config: &Config, global: &GlobalArgs) -> Result<()> {
    let session = open_session(config, global)?;
    let mut table = Table::new(&["failed test name"]);
    for case in session.report.failed() {
        table.push_row(vec![Cell::Text(case.test_name())]);
    }
    print_table(&table, global);
    Ok(())
}

fn cmd_show_claimed(config: &Config, global: &GlobalArgs) -> Result<()> {
    let session = open_session(config, global)?;
    let mut table = Table::new(&["claimed test name", "claim reason"]);
    for case in session.report.claimed() {
        table.push_row(vec![
            Cell::Text(case.test_name()),
            case.reason().unwrap_or_default().into(),
        ]);
    }
    print_table(&table, global);
    Ok(())
}

fn cmd_show_unclaimed(config: &Config, global: &GlobalArgs) -> Result<()> {
    let session = open_session(config, global)?;
    let mut table = Table::new(&["unclaimed test name"]);
    for case in session.report.unclaimed() {
        table.push_row(vec![Cell::Text(case.test_name())]);
    }
    print_table(&table, global);
    Ok(())
}

fn claims_table(events: &[ClaimEvent]) -> Table {
    let mut table = Table::new(&["claimable test name", "claim reason", "url"]);
    for event in events {
        table.push_row(vec![
            event.target.test_name.as_str().into(),
            event.reason.as_str().into(),
            event.target.url.as_str().into(),
        ]);
    }
    table
}

fn cmd_show_claimable(config: &Config, global: &GlobalArgs) -> Result<()> {
    let rules = load_kb(global)?;
    let mut session = open_session(config, global)?;
    let events = claim_by_rules(&mut session.report.cases, &rules, ClaimMode::DryRun)?;
    print_table(&claims_table(&events), global);
    Ok(())
}

fn cmd_show(config: &Config, global: &GlobalArgs, args: &ShowArgs) -> Result<()> {
    let grep = compile_grep("TEST_NAME_REGEXP", &args.test_name)?;
    let session = open_session(config, global)?;
    let mut shown = 0;
    for case in session
        .report
        .cases
        .iter()
        .filter(|case| grep.is_match(&case.test_name()))
    {
        let mut table = Table::new(&["field", "value"]);
        for (field, value) in case.stored() {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            table.push_row(vec![field.as_str().into(), Cell::Text(text)]);
        }
        if shown > 0 {
            println!();
        }
        print_table(&table, global);
        shown += 1;
    }
    if shown == 0 {
        tracing::warn!(pattern = %args.test_name, "no test case matches");
    }
    Ok(())
}

fn cmd_claim(config: &Config, global: &GlobalArgs, args: &ClaimArgs) -> Result<()> {
    let rules = load_kb(global)?;
    let mut session = open_session(config, global)?;
    let events = if args.dry_run {
        claim_by_rules(&mut session.report.cases, &rules, ClaimMode::DryRun)?
    } else {
        let mut sink = JenkinsClaims {
            client: session.client.as_ref(),
            sticky: args.sticky,
            propagate: args.propagate,
        };
        claim_by_rules(
            &mut session.report.cases,
            &rules,
            ClaimMode::Live(&mut sink),
        )
        .context("claim failed test results")?
    };
    tracing::info!(
        claims = events.len(),
        dry_run = args.dry_run,
        "claiming finished"
    );
    print_table(&claims_table(&events), global);
    Ok(())
}

fn cmd_stats(config: &Config, global: &GlobalArgs) -> Result<()> {
    let rules = load_kb(global)?;
    let mut tiers: Vec<String> = Vec::new();
    for build in config.builds(&global.job_group)? {
        if !tiers.contains(&build.tier) {
            tiers.push(build.tier);
        }
    }
    let session = open_session(config, global)?;
    for (idx, section) in stats::report_stats(&session.report, &rules, &tiers)
        .iter()
        .enumerate()
    {
        if idx > 0 {
            println!();
        }
        println!("{}", section.title);
        print_table(&section.table, global);
    }
    Ok(())
}

fn cmd_clean_cache(config: &Config, global: &GlobalArgs) -> Result<()> {
    match report::clean_cache(config, &global.job_group)? {
        Some(dir) => tracing::info!(dir = %dir.display(), "cache removed"),
        None => tracing::info!(job_group = %global.job_group, "nothing cached"),
    }
    Ok(())
}
