//! Rule-driven claiming over a report.
//!
//! Rules are applied in knowledge-base order; the first rule that matches a
//! failing, unclaimed case claims it and later rules never see that case.
use crate::case::TestCase;
use crate::error::ClaimsError;
use crate::rules::{FieldSource, Rule};
use serde::Serialize;

/// Identity of a case as the claim endpoint needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimTarget {
    pub test_name: String,
    pub url: String,
}

/// Side-effecting claim submission (the server's claim endpoint).
pub trait ClaimSink {
    fn submit_claim(&mut self, target: &ClaimTarget, reason: &str) -> Result<(), ClaimsError>;
}

/// A case the orchestrator can evaluate and claim.
pub trait Claimable: FieldSource {
    fn is_failing(&self) -> bool;
    fn claim_reason(&self) -> Option<&str>;
    fn record_claim(&mut self, reason: &str);
    fn claim_target(&self) -> ClaimTarget;
}

impl Claimable for TestCase {
    fn is_failing(&self) -> bool {
        TestCase::is_failing(self)
    }

    fn claim_reason(&self) -> Option<&str> {
        self.reason()
    }

    fn record_claim(&mut self, reason: &str) {
        self.set_reason(reason);
    }

    fn claim_target(&self) -> ClaimTarget {
        ClaimTarget {
            test_name: self.test_name(),
            url: self.url().to_string(),
        }
    }
}

/// Whether matches are submitted and recorded, or only collected.
pub enum ClaimMode<'a> {
    DryRun,
    Live(&'a mut dyn ClaimSink),
}

/// One claim, made or (in dry-run) proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimEvent {
    pub case_index: usize,
    pub rule_index: usize,
    pub target: ClaimTarget,
    pub reason: String,
}

/// Apply `rules` in order to every failing, unclaimed case.
///
/// A case takes at most one claim per run. In live mode the claim is
/// submitted and then written to the case before the next case is
/// considered; a failed submission aborts the run and leaves that case
/// untouched. Dry-run reaches the same decisions without either effect.
pub fn claim_by_rules<C: Claimable>(
    cases: &mut [C],
    rules: &[Rule],
    mut mode: ClaimMode<'_>,
) -> Result<Vec<ClaimEvent>, ClaimsError> {
    let mut claimed = vec![false; cases.len()];
    let mut events = Vec::new();

    for (rule_index, rule) in rules.iter().enumerate() {
        for (case_index, case) in cases.iter_mut().enumerate() {
            if claimed[case_index] || !case.is_failing() || case.claim_reason().is_some() {
                continue;
            }
            if !rule.matches(&*case)?.is_match() {
                continue;
            }
            let target = case.claim_target();
            tracing::info!(
                test = %target.test_name,
                url = %target.url,
                reason = %rule.reason,
                "case matches rule"
            );
            if let ClaimMode::Live(sink) = &mut mode {
                sink.submit_claim(&target, &rule.reason)?;
                case.record_claim(&rule.reason);
            }
            claimed[case_index] = true;
            events.push(ClaimEvent {
                case_index,
                rule_index,
                target,
                reason: rule.reason.clone(),
            });
        }
    }
    Ok(events)
}
