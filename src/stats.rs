//! Failure and claim statistics for a report.
use crate::case::{TestCase, TIER};
use crate::report::Report;
use crate::rules::Rule;
use crate::table::{Cell, Table};
use std::collections::BTreeMap;

/// Reason bucket for failures nobody has claimed yet.
pub const UNKNOWN_REASON: &str = "UNKNOWN";

/// A titled table of the statistics output.
pub struct StatsSection {
    pub title: &'static str,
    pub table: Table,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    all: usize,
    failed: usize,
}

impl Counts {
    fn ratio(self) -> f64 {
        ratio(self.failed, self.all)
    }
}

/// `part / whole`, or zero for an empty denominator.
pub fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn percent(part: usize, whole: usize) -> f64 {
    ratio(part, whole) * 100.0
}

/// Every statistics table, in display order.
pub fn report_stats(report: &Report, rules: &[Rule], tiers: &[String]) -> Vec<StatsSection> {
    vec![
        StatsSection {
            title: "Overall stats",
            table: overall(&report.cases),
        },
        StatsSection {
            title: "Stats per tier",
            table: per_tier(&report.cases, tiers),
        },
        StatsSection {
            title: "How various reasons for claims are used",
            table: per_reason(&report.cases, rules),
        },
        StatsSection {
            title: "How many failures are there per class",
            table: per_key(&report.cases, "class name", |case| case.class_name().to_string()),
        },
        StatsSection {
            title: "How many failures are there per method (CLI vs. API vs. UI)",
            table: per_key(&report.cases, "method", |case| method_of(case.class_name())),
        },
    ]
}

const SUMMARY_HEADERS: [&str; 5] = [
    "all reports",
    "failures",
    "failures [%]",
    "claimed failures",
    "claimed failures [%]",
];

fn summary_row<'a>(cases: impl Iterator<Item = &'a TestCase>) -> Vec<Cell> {
    let (mut all, mut failed, mut claimed) = (0, 0, 0);
    for case in cases {
        all += 1;
        if case.is_failing() {
            failed += 1;
            if case.is_claimed() {
                claimed += 1;
            }
        }
    }
    vec![
        Cell::Int(all),
        Cell::Int(failed),
        Cell::Float(percent(failed, all)),
        Cell::Int(claimed),
        Cell::Float(percent(claimed, failed)),
    ]
}

fn overall(cases: &[TestCase]) -> Table {
    let mut table = Table::new(&SUMMARY_HEADERS).with_precision(0);
    table.push_row(summary_row(cases.iter()));
    table
}

fn per_tier(cases: &[TestCase], tiers: &[String]) -> Table {
    let mut headers = vec!["tier"];
    headers.extend(SUMMARY_HEADERS);
    let mut table = Table::new(&headers).with_precision(0);
    for tier in tiers {
        let in_tier = cases
            .iter()
            .filter(|case| case.str_field(TIER).ok() == Some(tier.as_str()));
        let mut row = vec![Cell::Text(format!("t{tier}"))];
        row.extend(summary_row(in_tier));
        table.push_row(row);
    }
    table
}

fn per_reason(cases: &[TestCase], rules: &[Rule]) -> Table {
    let unclaimed = cases
        .iter()
        .filter(|case| case.is_failing() && !case.is_claimed())
        .count();
    let mut counts: Vec<(String, usize)> = vec![(UNKNOWN_REASON.to_string(), unclaimed)];
    for rule in rules {
        if !counts.iter().any(|(reason, _)| reason == &rule.reason) {
            counts.push((rule.reason.clone(), 0));
        }
    }
    for reason in cases
        .iter()
        .filter(|case| case.is_failing())
        .filter_map(TestCase::reason)
    {
        match counts.iter_mut().find(|(known, _)| known == reason) {
            Some((_, count)) => *count += 1,
            None => counts.push((reason.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let mut table = Table::new(&[
        "claim reason",
        "number of times",
        "is it in current knowledge base?",
    ]);
    for (reason, count) in counts {
        let known = rules.iter().any(|rule| rule.reason == reason);
        table.push_row(vec![Cell::Text(reason), Cell::Int(count), Cell::Bool(known)]);
    }
    table
}

fn per_key(cases: &[TestCase], label: &str, key: impl Fn(&TestCase) -> String) -> Table {
    let mut buckets: BTreeMap<String, Counts> = BTreeMap::new();
    for case in cases {
        let counts = buckets.entry(key(case)).or_default();
        counts.all += 1;
        if case.is_failing() {
            counts.failed += 1;
        }
    }
    let mut rows: Vec<(String, Counts)> = buckets.into_iter().collect();
    rows.sort_by(|a, b| b.1.ratio().total_cmp(&a.1.ratio()));

    let mut table = Table::new(&[label, "number of reports", "number of failures", "failures ratio"])
        .with_precision(3);
    for (name, counts) in rows {
        table.push_row(vec![
            Cell::Text(name),
            Cell::Int(counts.all),
            Cell::Int(counts.failed),
            Cell::Float(counts.ratio()),
        ]);
    }
    table
}

/// Interface a test exercises, taken from `tests.foreman.<method>.…`.
fn method_of(class_name: &str) -> String {
    class_name
        .split('.')
        .nth(2)
        .unwrap_or(class_name)
        .to_string()
}
