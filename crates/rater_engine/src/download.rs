use std::path::{Path, PathBuf};

use rater_core::BatchJob;
use rater_logging::{rater_info, rater_warn};

use crate::persist::{write_atomically, PersistError};
use crate::retry::{retry_with_backoff, RetryPolicy, Sleeper};
use crate::{BatchService, ServiceError};

/// Where downloaded result artifacts are saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPaths {
    pub output: PathBuf,
    pub errors: PathBuf,
}

impl ResultPaths {
    /// `{stem}_output.jsonl` and `{stem}_errors.jsonl` next to the artifact.
    pub fn beside_artifact(artifact: &Path) -> Self {
        let stem = artifact
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("batch");
        let dir = artifact.parent().unwrap_or_else(|| Path::new(""));
        Self {
            output: dir.join(format!("{stem}_output.jsonl")),
            errors: dir.join(format!("{stem}_errors.jsonl")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub file_id: String,
    pub path: PathBuf,
    pub text: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadedResults {
    pub output: Option<DownloadedArtifact>,
    pub errors: Option<DownloadedArtifact>,
}

impl DownloadedResults {
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_ref().map(|a| a.text.as_str())
    }

    pub fn errors_text(&self) -> Option<&str> {
        self.errors.as_ref().map(|a| a.text.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download of file {file_id} failed: {source}")]
    Fetch {
        file_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("cannot save {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

/// Fetch and save whichever result artifacts the terminal job references.
pub async fn download_results(
    service: &dyn BatchService,
    sleeper: &dyn Sleeper,
    retry: &RetryPolicy,
    job: &BatchJob,
    paths: &ResultPaths,
) -> Result<DownloadedResults, DownloadError> {
    let mut results = DownloadedResults::default();
    if let Some(file_id) = job.output_file_id.as_deref() {
        results.output = Some(fetch_one(service, sleeper, retry, file_id, &paths.output).await?);
    }
    if let Some(file_id) = job.error_file_id.as_deref() {
        results.errors = Some(fetch_one(service, sleeper, retry, file_id, &paths.errors).await?);
    }
    if results.output.is_none() && results.errors.is_none() {
        rater_warn!("batch {} finished {} without result files", job.id, job.status);
    }
    Ok(results)
}

async fn fetch_one(
    service: &dyn BatchService,
    sleeper: &dyn Sleeper,
    retry: &RetryPolicy,
    file_id: &str,
    path: &Path,
) -> Result<DownloadedArtifact, DownloadError> {
    rater_info!("downloading file {} to {:?}", file_id, path);
    let bytes = retry_with_backoff(retry, sleeper, || service.download_file(file_id))
        .await
        .map_err(|source| DownloadError::Fetch {
            file_id: file_id.to_string(),
            source,
        })?;

    let saved = write_atomically(path, &bytes).map_err(|source| DownloadError::Persist {
        path: path.to_path_buf(),
        source,
    })?;

    // Invalid bytes only spoil the lines they sit on; reconciliation reports those lines.
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            rater_warn!("file {} is not valid UTF-8; decoding lossily", file_id);
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    let line_count = text.lines().filter(|l| !l.trim().is_empty()).count();
    rater_info!("saved {} lines to {:?}", line_count, saved);

    Ok(DownloadedArtifact {
        file_id: file_id.to_string(),
        path: saved,
        text,
        line_count,
    })
}
