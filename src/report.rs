//! Test results of one job group, pulled from the server (or its cache).
use crate::case::{TestCase, DISTRO, TIER, URL};
use crate::config::{Build, Config};
use crate::error::ClaimsError;
use crate::foreman_debug::ForemanDebug;
use crate::jenkins::JenkinsClient;
use crate::production_log::{LogFetcher, ProductionLog};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Fields requested from the test report API.
const REPORT_TREE: &str = "suites[cases[className,duration,name,status,stdout,errorDetails,errorStackTrace,testActions[reason]]]{0}";
const REPORT_CACHE_FILE: &str = "main.json";
const PRODUCTION_LOG_FILE: &str = "production.log";

#[derive(Deserialize)]
struct TestReport {
    #[serde(default)]
    suites: Vec<Suite>,
}

#[derive(Deserialize)]
struct Suite {
    #[serde(default)]
    cases: Vec<Map<String, Value>>,
}

/// Cases of every build in a job group, in config order.
#[derive(Debug)]
pub struct Report {
    pub job_group: String,
    pub cases: Vec<TestCase>,
}

impl Report {
    pub fn from_cases(job_group: &str, cases: Vec<TestCase>) -> Self {
        Self {
            job_group: job_group.to_string(),
            cases,
        }
    }

    /// Pull (or read from cache) the test reports of every build in the group.
    pub fn load(
        config: &Config,
        client: &Rc<JenkinsClient>,
        job_group: &str,
    ) -> Result<Self, ClaimsError> {
        let group_dir = config.group_cache_dir(job_group);
        let mut cases = Vec::new();
        for build in config.builds(job_group)? {
            let job_dir = group_dir.join(&build.name);
            let production_log = Rc::new(production_log_for(client, &job_dir, &build));
            let raw = pull_reports(client, &job_dir, &build)?;
            tracing::debug!(job = %build.name, cases = raw.len(), "test report loaded");
            for mut fields in raw {
                fields.insert(TIER.to_string(), Value::String(build.tier.clone()));
                fields.insert(DISTRO.to_string(), Value::String(build.distro.clone()));
                cases.push(TestCase::new(fields).with_log(production_log.clone()));
            }
        }
        tracing::info!(job_group, cases = cases.len(), "report loaded");
        Ok(Self::from_cases(job_group, cases))
    }

    /// Keep only cases whose `className.name` matches `grep`.
    pub fn retain_test_names(&mut self, grep: &Regex) {
        self.cases.retain(|case| grep.is_match(&case.test_name()));
    }

    pub fn failed(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter().filter(|case| case.is_failing())
    }

    pub fn claimed(&self) -> impl Iterator<Item = &TestCase> {
        self.failed().filter(|case| case.is_claimed())
    }

    pub fn unclaimed(&self) -> impl Iterator<Item = &TestCase> {
        self.failed().filter(|case| !case.is_claimed())
    }
}

/// Remove everything cached for a job group.
pub fn clean_cache(config: &Config, job_group: &str) -> Result<Option<PathBuf>, ClaimsError> {
    let dir = config.group_cache_dir(job_group);
    if !dir.exists() {
        return Ok(None);
    }
    std::fs::remove_dir_all(&dir).map_err(|source| ClaimsError::Cache {
        path: dir.clone(),
        source,
    })?;
    Ok(Some(dir))
}

fn production_log_for(client: &Rc<JenkinsClient>, job_dir: &Path, build: &Build) -> ProductionLog {
    let path = job_dir.join(PRODUCTION_LOG_FILE);
    let fetcher: Option<Box<dyn LogFetcher>> = if path.is_file() {
        None
    } else {
        Some(Box::new(ForemanDebug::new(
            client.clone(),
            &build.name,
            &build.build,
        )))
    };
    ProductionLog::new(path, fetcher)
}

fn pull_reports(
    client: &JenkinsClient,
    job_dir: &Path,
    build: &Build,
) -> Result<Vec<Map<String, Value>>, ClaimsError> {
    let build_url = client.build_url(&build.name, &build.build);
    let report_url = format!("{build_url}/testReport/api/json");
    let text = client.get_text(
        &report_url,
        &[("tree", REPORT_TREE)],
        &[200, 404],
        Some(&job_dir.join(REPORT_CACHE_FILE)),
    )?;
    parse_report(&text, &build_url).map_err(|err| ClaimsError::Http {
        url: report_url,
        detail: format!("malformed test report: {err}"),
    })
}

/// Flatten suites into case objects, each enriched with its result URL.
fn parse_report(text: &str, build_url: &str) -> serde_json::Result<Vec<Map<String, Value>>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let report: TestReport = serde_json::from_str(text)?;
    let mut cases: Vec<Map<String, Value>> = report
        .suites
        .into_iter()
        .flat_map(|suite| suite.cases)
        .collect();
    for case in &mut cases {
        let url = case_url(build_url, case);
        case.insert(URL.to_string(), Value::String(url));
    }
    Ok(cases)
}

/// `{build}/testReport/junit/{package}/{class}/{name}`
fn case_url(build_url: &str, case: &Map<String, Value>) -> String {
    let class_name = case.get("className").and_then(Value::as_str).unwrap_or_default();
    let name = case.get("name").and_then(Value::as_str).unwrap_or_default();
    let (package, class) = class_name.rsplit_once('.').unwrap_or(("", class_name));
    format!("{build_url}/testReport/junit/{package}/{class}/{name}")
}
