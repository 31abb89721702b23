//! Production log retrieval from a build's `foreman-debug` archive.
use crate::error::ClaimsError;
use crate::jenkins::JenkinsClient;
use crate::production_log::LogFetcher;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

const ARCHIVE_NAME: &str = "foreman-debug.tar.xz";

/// Location of the log inside the unpacked archive.
fn log_path_in_archive(extracted: &Path) -> PathBuf {
    extracted
        .join("foreman-debug")
        .join("var")
        .join("log")
        .join("foreman")
        .join("production.log")
}

/// Downloads and unpacks the archive the first time the log is needed.
pub struct ForemanDebug {
    client: Rc<JenkinsClient>,
    url: String,
}

impl ForemanDebug {
    pub fn new(client: Rc<JenkinsClient>, job: &str, build: &str) -> Self {
        let url = format!("{}/artifact/{}", client.build_url(job, build), ARCHIVE_NAME);
        Self { client, url }
    }

    #[cfg(test)]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn artifact_error(&self, detail: impl Into<String>) -> ClaimsError {
        ClaimsError::Artifact {
            url: self.url.clone(),
            detail: detail.into(),
        }
    }
}

impl LogFetcher for ForemanDebug {
    fn fetch(&self, dest: &Path) -> Result<(), ClaimsError> {
        let archive = tempfile::NamedTempFile::new()
            .map_err(|err| self.artifact_error(format!("create temp file: {err}")))?;
        self.client.download(&self.url, archive.path())?;

        let extracted = tempfile::tempdir()
            .map_err(|err| self.artifact_error(format!("create temp dir: {err}")))?;
        let status = Command::new("tar")
            .arg("-xf")
            .arg(archive.path())
            .arg("--directory")
            .arg(extracted.path())
            .status()
            .map_err(|err| self.artifact_error(format!("run tar: {err}")))?;
        if !status.success() {
            return Err(self.artifact_error(format!("tar exited with {status}")));
        }
        tracing::debug!(dir = %extracted.path().display(), "archive extracted");

        install_log(&log_path_in_archive(extracted.path()), dest)
            .map_err(|err| self.artifact_error(err.to_string()))
    }
}

fn install_log(source: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, dest)?;
    Ok(())
}
