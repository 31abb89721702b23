//! Test case records with stored fields and lazily derived ones.
//!
//! A case is the JSON object the server returns for one test result, plus
//! caller-attached metadata and an optional production-log accessor. Derived
//! fields are computed on first lookup and memoized for the lifetime of the
//! record.
use crate::error::ClaimsError;
use crate::production_log::LogAccessor;
use crate::rules::FieldSource;
use crate::timing::{extract_timings, Timings};
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const CLASS_NAME: &str = "className";
pub const NAME: &str = "name";
pub const STATUS: &str = "status";
pub const STDOUT: &str = "stdout";
pub const TEST_ACTIONS: &str = "testActions";
pub const URL: &str = "url";
pub const TIER: &str = "tier";
pub const DISTRO: &str = "distro";

pub const TEST_NAME: &str = "testName";
pub const START: &str = "start";
pub const END: &str = "end";
pub const PRODUCTION_LOG: &str = "production.log";
pub const PRODUCTION_LOG_SLICE: &str = "productionLogSlice";

/// Statuses that count as a failure worth claiming.
pub const FAIL_STATUSES: [&str; 3] = ["FAILED", "ERROR", "REGRESSION"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value returned by a field lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    /// Text a rule pattern is searched in; `None` for JSON null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Json(Value::Null) => None,
            FieldValue::Json(Value::String(text)) => Some(Cow::Borrowed(text)),
            FieldValue::Json(other) => Some(Cow::Owned(other.to_string())),
            FieldValue::Text(text) => Some(Cow::Borrowed(text)),
            FieldValue::Timestamp(ts) => Some(Cow::Owned(ts.format(TIMESTAMP_FORMAT).to_string())),
        }
    }
}

type DeriveFn = fn(&TestCase) -> Result<FieldValue, ClaimsError>;

/// How a field name resolves when it is neither cached nor stored.
enum FieldKind {
    Stored,
    Derived(DeriveFn),
}

fn field_kind(field: &str) -> FieldKind {
    match field {
        TEST_NAME => FieldKind::Derived(derive_test_name),
        START => FieldKind::Derived(derive_start),
        END => FieldKind::Derived(derive_end),
        PRODUCTION_LOG | PRODUCTION_LOG_SLICE => FieldKind::Derived(derive_log_slice),
        _ => FieldKind::Stored,
    }
}

/// Result of one test case.
pub struct TestCase {
    fields: Map<String, Value>,
    log: Option<Rc<dyn LogAccessor>>,
    derived: RefCell<BTreeMap<String, FieldValue>>,
}

impl TestCase {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            log: None,
            derived: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_log(mut self, log: Rc<dyn LogAccessor>) -> Self {
        self.log = Some(log);
        self
    }

    #[cfg(test)]
    pub fn insert(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    /// Stored fields as received from the server plus attached metadata.
    pub fn stored(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look a field up: memoized derived values first, then stored fields,
    /// then the deriving function (whose result is memoized).
    pub fn get(&self, field: &str) -> Result<FieldValue, ClaimsError> {
        if let Some(cached) = self.derived.borrow().get(field) {
            return Ok(cached.clone());
        }
        if let Some(value) = self.fields.get(field) {
            return Ok(FieldValue::Json(value.clone()));
        }
        match field_kind(field) {
            FieldKind::Stored => Err(ClaimsError::missing_field(field)),
            FieldKind::Derived(derive) => {
                let value = derive(self)?;
                self.derived
                    .borrow_mut()
                    .insert(field.to_string(), value.clone());
                Ok(value)
            }
        }
    }

    /// Stored string field, with JSON null and absence both reported as missing.
    pub fn str_field(&self, field: &str) -> Result<&str, ClaimsError> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| ClaimsError::missing_field(field))
    }

    pub fn class_name(&self) -> &str {
        self.str_field(CLASS_NAME).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.str_field(NAME).unwrap_or_default()
    }

    pub fn status(&self) -> &str {
        self.str_field(STATUS).unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.str_field(URL).unwrap_or_default()
    }

    pub fn test_name(&self) -> String {
        format!("{}.{}", self.class_name(), self.name())
    }

    pub fn is_failing(&self) -> bool {
        FAIL_STATUSES.contains(&self.status())
    }

    /// Claim reason recorded on the first test action, if any.
    pub fn reason(&self) -> Option<&str> {
        self.fields
            .get(TEST_ACTIONS)?
            .get(0)?
            .get("reason")?
            .as_str()
            .filter(|reason| !reason.is_empty())
    }

    pub fn is_claimed(&self) -> bool {
        self.reason().is_some()
    }

    /// Record a claim reason on the first test action, creating it if needed.
    pub fn set_reason(&mut self, reason: &str) {
        let actions = self
            .fields
            .entry(TEST_ACTIONS.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !actions.is_array() {
            *actions = Value::Array(Vec::new());
        }
        if let Value::Array(list) = actions {
            if list.is_empty() {
                list.push(Value::Object(Map::new()));
            }
            if !list[0].is_object() {
                list[0] = Value::Object(Map::new());
            }
            if let Value::Object(first) = &mut list[0] {
                first.insert("reason".to_string(), Value::String(reason.to_string()));
            }
        }
    }

    fn timings(&self) -> Result<Timings, ClaimsError> {
        let stdout = match self.fields.get(STDOUT) {
            Some(Value::String(text)) => text,
            _ => return Err(ClaimsError::missing_field(STDOUT)),
        };
        let timings =
            extract_timings(stdout)?.ok_or_else(|| ClaimsError::missing_field(START))?;
        let mut cache = self.derived.borrow_mut();
        cache.insert(START.to_string(), FieldValue::Timestamp(timings.start));
        cache.insert(END.to_string(), FieldValue::Timestamp(timings.end));
        Ok(timings)
    }

    fn timestamp(&self, field: &str) -> Result<NaiveDateTime, ClaimsError> {
        match self.get(field)? {
            FieldValue::Timestamp(ts) => Ok(ts),
            _ => Err(ClaimsError::missing_field(field)),
        }
    }
}

fn derive_test_name(case: &TestCase) -> Result<FieldValue, ClaimsError> {
    let class_name = case.str_field(CLASS_NAME)?;
    let name = case.str_field(NAME)?;
    Ok(FieldValue::Text(format!("{class_name}.{name}")))
}

fn derive_start(case: &TestCase) -> Result<FieldValue, ClaimsError> {
    Ok(FieldValue::Timestamp(case.timings()?.start))
}

fn derive_end(case: &TestCase) -> Result<FieldValue, ClaimsError> {
    Ok(FieldValue::Timestamp(case.timings()?.end))
}

fn derive_log_slice(case: &TestCase) -> Result<FieldValue, ClaimsError> {
    let log = case
        .log
        .as_ref()
        .ok_or_else(|| ClaimsError::missing_field(PRODUCTION_LOG))?;
    let start = case.timestamp(START)?;
    let end = case.timestamp(END)?;
    let text: String = log
        .from_to(start, end)?
        .iter()
        .map(|record| record.text())
        .collect();
    Ok(FieldValue::Text(text))
}

impl FieldSource for TestCase {
    fn field_text(&self, field: &str) -> Result<Option<String>, ClaimsError> {
        Ok(self.get(field)?.as_text().map(Cow::into_owned))
    }

    fn label(&self) -> String {
        self.name().to_string()
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("test_name", &self.test_name())
            .field("status", &self.status())
            .field("log_attached", &self.log.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "case_tests.rs"]
mod tests;
