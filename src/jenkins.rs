//! Blocking HTTP client for the Jenkins REST API.
//!
//! Responses can be cached on disk: a cache hit is returned without touching
//! the network. Nothing here retries.
use crate::claiming::{ClaimSink, ClaimTarget};
use crate::config::Config;
use crate::error::ClaimsError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fs;
use std::io;
use std::path::Path;
use ureq::tls::TlsConfig;
use ureq::Agent;

/// Upper bound for a single text response (test reports embed stdout).
const MAX_TEXT_BYTES: u64 = 512 * 1024 * 1024;
/// The claim endpoint answers a successful claim with a redirect.
const CLAIM_OK_STATUS: u16 = 302;

#[derive(Deserialize)]
struct Crumb {
    #[serde(rename = "crumbRequestField")]
    field: String,
    crumb: String,
}

#[derive(Serialize)]
struct ClaimPayload<'a> {
    assignee: &'a str,
    reason: &'a str,
    sticky: bool,
    #[serde(rename = "propagateToFollowingBuilds")]
    propagate_to_following_builds: bool,
}

pub struct JenkinsClient {
    agent: Agent,
    base_url: String,
    authorization: String,
    crumb: OnceCell<(String, String)>,
}

impl JenkinsClient {
    pub fn new(config: &Config) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .tls_config(
                TlsConfig::builder()
                    .disable_verification(config.insecure)
                    .build(),
            )
            .build();
        Self {
            agent: agent_config.into(),
            base_url: config.base_url().to_string(),
            authorization: basic_authorization(&config.usr, &config.pwd),
            crumb: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of one build of a job.
    pub fn build_url(&self, job: &str, build: &str) -> String {
        format!("{}/job/{}/{}", self.base_url, job, build)
    }

    /// GET a text resource, honouring and filling the cache file when given.
    ///
    /// A 404 listed in `expected` means "nothing there" and yields empty text.
    pub fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        expected: &[u16],
        cache: Option<&Path>,
    ) -> Result<String, ClaimsError> {
        if let Some(path) = cache.filter(|path| path.is_file()) {
            tracing::debug!(path = %path.display(), "cache hit");
            return fs::read_to_string(path).map_err(|source| ClaimsError::Cache {
                path: path.to_path_buf(),
                source,
            });
        }

        let mut request = self
            .agent
            .get(url)
            .header("Authorization", self.authorization.as_str());
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        tracing::debug!(%url, "GET");
        let mut response = request.call().map_err(|err| http_error(url, err))?;
        let status = response.status().as_u16();
        if !expected.contains(&status) {
            return Err(ClaimsError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }
        if status == 404 {
            return Ok(String::new());
        }
        let text = response
            .body_mut()
            .with_config()
            .limit(MAX_TEXT_BYTES)
            .read_to_string()
            .map_err(|err| http_error(url, err))?;

        if let Some(path) = cache {
            write_cache(path, text.as_bytes())?;
        }
        Ok(text)
    }

    /// Stream a binary artifact into `dest`.
    pub fn download(&self, url: &str, dest: &Path) -> Result<(), ClaimsError> {
        tracing::info!(%url, dest = %dest.display(), "downloading artifact");
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", self.authorization.as_str())
            .call()
            .map_err(|err| http_error(url, err))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClaimsError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }
        let mut file = fs::File::create(dest).map_err(|source| ClaimsError::Cache {
            path: dest.to_path_buf(),
            source,
        })?;
        io::copy(&mut response.body_mut().as_reader(), &mut file).map_err(|err| {
            ClaimsError::Http {
                url: url.to_string(),
                detail: err.to_string(),
            }
        })?;
        Ok(())
    }

    /// CSRF crumb header, fetched once per client.
    fn crumb_header(&self) -> Result<&(String, String), ClaimsError> {
        if let Some(crumb) = self.crumb.get() {
            return Ok(crumb);
        }
        let url = format!("{}/crumbIssuer/api/json", self.base_url);
        let body = self.get_text(&url, &[], &[200], None)?;
        let crumb: Crumb = serde_json::from_str(&body).map_err(|err| ClaimsError::Http {
            url: url.clone(),
            detail: format!("unexpected crumb response: {err}"),
        })?;
        Ok(self.crumb.get_or_init(|| (crumb.field, crumb.crumb)))
    }

    /// POST a claim for one test result.
    pub fn push_claim(
        &self,
        target: &ClaimTarget,
        reason: &str,
        sticky: bool,
        propagate: bool,
    ) -> Result<(), ClaimsError> {
        tracing::info!(test = %target.test_name, %reason, "claiming");
        let submission_error = |detail: String| ClaimsError::ClaimSubmission {
            target: target.test_name.clone(),
            detail,
        };
        let (crumb_field, crumb) = self.crumb_header()?;
        let payload = claim_payload(reason, sticky, propagate)
            .map_err(|err| submission_error(err.to_string()))?;
        let url = format!("{}/claim/claim", target.url);
        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.authorization.as_str())
            .header(crumb_field.as_str(), crumb.as_str())
            .send_form([("json", payload.as_str())])
            .map_err(|err| submission_error(err.to_string()))?;
        let status = response.status().as_u16();
        if status != CLAIM_OK_STATUS {
            return Err(submission_error(format!("unexpected status {status}")));
        }
        Ok(())
    }
}

/// Claim sink backed by the server's claim plugin.
pub struct JenkinsClaims<'a> {
    pub client: &'a JenkinsClient,
    pub sticky: bool,
    pub propagate: bool,
}

impl ClaimSink for JenkinsClaims<'_> {
    fn submit_claim(&mut self, target: &ClaimTarget, reason: &str) -> Result<(), ClaimsError> {
        self.client
            .push_claim(target, reason, self.sticky, self.propagate)
    }
}

fn basic_authorization(user: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {token}")
}

fn claim_payload(reason: &str, sticky: bool, propagate: bool) -> serde_json::Result<String> {
    serde_json::to_string(&ClaimPayload {
        assignee: "",
        reason,
        sticky,
        propagate_to_following_builds: propagate,
    })
}

fn http_error(url: &str, err: ureq::Error) -> ClaimsError {
    ClaimsError::Http {
        url: url.to_string(),
        detail: err.to_string(),
    }
}

fn write_cache(path: &Path, bytes: &[u8]) -> Result<(), ClaimsError> {
    let cache_error = |source| ClaimsError::Cache {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(cache_error)?;
    }
    fs::write(path, bytes).map_err(cache_error)?;
    Ok(())
}
