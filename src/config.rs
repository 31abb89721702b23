//! Tool configuration loaded from `config.yaml`.
//!
//! Holds server credentials, the cache location and the job groups a report
//! is assembled from. It is passed explicitly to the HTTP client and report
//! loader; rule evaluation never reads it.
use crate::error::ClaimsError;
use anyhow::{anyhow, Context, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_CACHE_DIR: &str = ".cache/";
/// Job group used when none is given on the command line.
pub const LATEST: &str = "latest";

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_insecure() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server root, e.g. `https://jenkins.example.com`.
    pub url: String,
    pub usr: String,
    pub pwd: String,
    /// Skip TLS certificate verification.
    #[serde(default = "default_insecure")]
    pub insecure: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub job_groups: BTreeMap<String, JobGroup>,
}

/// Jobs evaluated together as one report.
#[derive(Debug, Clone, Deserialize)]
pub struct JobGroup {
    /// Job name template with `{key}` placeholders filled from each job.
    pub template: String,
    pub jobs: Vec<BTreeMap<String, YamlValue>>,
}

/// One job build of a group, with the metadata attached to its cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub name: String,
    pub build: String,
    pub tier: String,
    pub distro: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config = Self::parse(&text).with_context(|| format!("load {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text).context("parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("url must be non-empty"));
        }
        for (name, group) in &self.job_groups {
            if group.template.trim().is_empty() {
                return Err(anyhow!("job group {name:?} has an empty template"));
            }
        }
        Ok(())
    }

    /// Server root without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Cache directory of one job group.
    pub fn group_cache_dir(&self, job_group: &str) -> PathBuf {
        self.cache_dir.join(job_group)
    }

    /// Builds of a job group in config order, with job names expanded.
    pub fn builds(&self, job_group: &str) -> Result<Vec<Build>, ClaimsError> {
        let group = self
            .job_groups
            .get(job_group)
            .ok_or_else(|| ClaimsError::Config {
                detail: format!("unknown job group {job_group:?}"),
            })?;
        group
            .jobs
            .iter()
            .map(|job| {
                let values = scalar_values(job)?;
                let required = |key: &str| {
                    values.get(key).cloned().ok_or_else(|| ClaimsError::Config {
                        detail: format!("job in group {job_group:?} lacks {key:?}"),
                    })
                };
                Ok(Build {
                    name: expand_template(&group.template, &values)?,
                    build: required("build")?,
                    tier: required("tier")?,
                    distro: required("rhel")?,
                })
            })
            .collect()
    }
}

fn scalar_values(job: &BTreeMap<String, YamlValue>) -> Result<BTreeMap<String, String>, ClaimsError> {
    job.iter()
        .map(|(key, value)| {
            let text = match value {
                YamlValue::String(text) => text.clone(),
                YamlValue::Number(number) => number.to_string(),
                YamlValue::Bool(flag) => flag.to_string(),
                _ => {
                    return Err(ClaimsError::Config {
                        detail: format!("job key {key:?} must be a scalar"),
                    })
                }
            };
            Ok((key.clone(), text))
        })
        .collect()
}

/// Fill `{key}` placeholders from `values`.
pub fn expand_template(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, ClaimsError> {
    let placeholder = Regex::new(r"\{(\w+)\}").expect("valid placeholder regex");
    let mut missing = None;
    let expanded = placeholder.replace_all(template, |caps: &Captures<'_>| {
        match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    if let Some(key) = missing {
        return Err(ClaimsError::Config {
            detail: format!("template {template:?} references unknown key {key:?}"),
        });
    }
    Ok(expanded.into_owned())
}
