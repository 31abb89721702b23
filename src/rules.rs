//! Knowledge-base rules and the predicate evaluator.
//!
//! A rule is a tree of `{"field": ..., "pattern": ...}` leaves combined with
//! `{"AND": [...]}` and `{"OR": [...]}` lists, plus the `reason` text used
//! when the rule claims a case.
use crate::error::ClaimsError;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

pub const DEFAULT_KB_PATH: &str = "kb.json";

/// Anything a rule can be evaluated against.
pub trait FieldSource {
    /// Text of `field`; `Ok(None)` when the field exists but is null.
    fn field_text(&self, field: &str) -> Result<Option<String>, ClaimsError>;

    /// Short label used in evaluation traces.
    fn label(&self) -> String;
}

/// Three-valued result of evaluating a rule node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Match,
    NoMatch,
    /// The field could not be resolved; aggregates treat this as no match.
    Indeterminate,
}

impl Outcome {
    pub fn is_match(self) -> bool {
        matches!(self, Outcome::Match)
    }
}

impl From<bool> for Outcome {
    fn from(matched: bool) -> Self {
        if matched {
            Outcome::Match
        } else {
            Outcome::NoMatch
        }
    }
}

/// One predicate of a rule tree.
#[derive(Debug, Clone)]
pub enum RuleNode {
    FieldMatch { field: String, pattern: Regex },
    /// Empty list holds vacuously.
    And(Vec<RuleNode>),
    /// Empty list never holds.
    Or(Vec<RuleNode>),
}

impl RuleNode {
    /// Parse a node, checking shape in the order field/pattern, AND, OR.
    pub fn from_json(node: &Value) -> Result<Self, ClaimsError> {
        let malformed = || ClaimsError::MalformedRule {
            node: node.to_string(),
        };
        if let (Some(field), Some(pattern)) = (node.get("field"), node.get("pattern")) {
            let (Some(field), Some(pattern)) = (field.as_str(), pattern.as_str()) else {
                return Err(malformed());
            };
            let pattern = Regex::new(pattern).map_err(|_| malformed())?;
            return Ok(RuleNode::FieldMatch {
                field: field.to_string(),
                pattern,
            });
        }
        if let Some(children) = node.get("AND") {
            return Ok(RuleNode::And(parse_children(children).ok_or_else(malformed)??));
        }
        if let Some(children) = node.get("OR") {
            return Ok(RuleNode::Or(parse_children(children).ok_or_else(malformed)??));
        }
        Err(malformed())
    }

    pub fn to_json(&self) -> Value {
        match self {
            RuleNode::FieldMatch { field, pattern } => {
                json!({ "field": field, "pattern": pattern.as_str() })
            }
            RuleNode::And(children) => {
                json!({ "AND": children.iter().map(RuleNode::to_json).collect::<Vec<_>>() })
            }
            RuleNode::Or(children) => {
                json!({ "OR": children.iter().map(RuleNode::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Evaluate against `source`. Field-level lookup failures make a leaf
    /// indeterminate; any other lookup error aborts the evaluation.
    pub fn evaluate<S: FieldSource + ?Sized>(&self, source: &S) -> Result<Outcome, ClaimsError> {
        self.evaluate_at(source, 0)
    }

    fn evaluate_at<S: FieldSource + ?Sized>(
        &self,
        source: &S,
        depth: usize,
    ) -> Result<Outcome, ClaimsError> {
        let indent = depth * 4;
        tracing::debug!("{:indent$}rule_matches({}, {})", "", source.label(), self);
        match self {
            RuleNode::FieldMatch { field, pattern } => match source.field_text(field) {
                Ok(text) => {
                    let outcome = Outcome::from(pattern.is_match(text.as_deref().unwrap_or("")));
                    tracing::debug!("{:indent$}=> {outcome:?}", "");
                    Ok(outcome)
                }
                Err(err) if err.is_field_level() => {
                    tracing::debug!("{:indent$}=> failed to get field {field} from case: {err}", "");
                    Ok(Outcome::Indeterminate)
                }
                Err(err) => Err(err),
            },
            RuleNode::And(children) => {
                for child in children {
                    let outcome = child.evaluate_at(source, depth + 1)?;
                    if !outcome.is_match() {
                        return Ok(outcome);
                    }
                }
                Ok(Outcome::Match)
            }
            RuleNode::Or(children) => {
                for child in children {
                    if child.evaluate_at(source, depth + 1)?.is_match() {
                        return Ok(Outcome::Match);
                    }
                }
                Ok(Outcome::NoMatch)
            }
        }
    }
}

fn parse_children(children: &Value) -> Option<Result<Vec<RuleNode>, ClaimsError>> {
    let list = children.as_array()?;
    Some(list.iter().map(RuleNode::from_json).collect())
}

impl fmt::Display for RuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// A knowledge-base entry: a predicate tree and the claim reason it assigns.
#[derive(Debug, Clone)]
pub struct Rule {
    pub reason: String,
    pub node: RuleNode,
}

impl Rule {
    pub fn from_json(entry: &Value) -> Result<Self, ClaimsError> {
        let reason = entry
            .get("reason")
            .and_then(Value::as_str)
            .ok_or_else(|| ClaimsError::MalformedRule {
                node: entry.to_string(),
            })?;
        Ok(Rule {
            reason: reason.to_string(),
            node: RuleNode::from_json(entry)?,
        })
    }

    pub fn matches<S: FieldSource + ?Sized>(&self, source: &S) -> Result<Outcome, ClaimsError> {
        self.node.evaluate(source)
    }
}

/// Parse a JSON knowledge base, keeping rule order.
pub fn parse_rules(text: &str) -> Result<Vec<Rule>> {
    let entries: Vec<Value> = serde_json::from_str(text).context("parse knowledge base JSON")?;
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| Rule::from_json(entry).with_context(|| format!("rule #{idx}")))
        .collect()
}

pub fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read knowledge base {}", path.display()))?;
    let rules = parse_rules(&text).with_context(|| format!("load {}", path.display()))?;
    tracing::debug!(count = rules.len(), path = %path.display(), "knowledge base loaded");
    Ok(rules)
}

/// Keep only rules whose reason matches `grep`.
pub fn filter_rules(rules: Vec<Rule>, grep: &Regex) -> Vec<Rule> {
    rules
        .into_iter()
        .filter(|rule| grep.is_match(&rule.reason))
        .collect()
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
