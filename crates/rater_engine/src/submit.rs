use std::io;
use std::path::{Path, PathBuf};

use rater_core::{BatchJob, CompletionWindow};
use rater_logging::rater_info;

use crate::{BatchService, ServiceError};

const FALLBACK_UPLOAD_NAME: &str = "batch_input.jsonl";

/// Upload and creation failures are surfaced as-is; retrying could create a duplicate job.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("cannot read artifact {path:?}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artifact upload failed: {0}")]
    Upload(#[source] ServiceError),
    #[error("batch creation for file {file_id} failed: {source}")]
    Create {
        file_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("cannot resume batch {job_id}: {source}")]
    Resume {
        job_id: String,
        #[source]
        source: ServiceError,
    },
}

pub struct Submitter<'a> {
    service: &'a dyn BatchService,
}

impl<'a> Submitter<'a> {
    pub fn new(service: &'a dyn BatchService) -> Self {
        Self { service }
    }

    /// Upload the artifact at `artifact_path` and create a batch job bound to it.
    pub async fn submit(
        &self,
        artifact_path: &Path,
        endpoint: &str,
        window: CompletionWindow,
    ) -> Result<BatchJob, SubmissionError> {
        let content =
            tokio::fs::read(artifact_path)
                .await
                .map_err(|source| SubmissionError::ReadArtifact {
                    path: artifact_path.to_path_buf(),
                    source,
                })?;
        let filename = artifact_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(FALLBACK_UPLOAD_NAME);

        rater_info!(
            "uploading {:?} ({} bytes)",
            artifact_path,
            content.len()
        );
        let file = self
            .service
            .upload_file(filename, content)
            .await
            .map_err(SubmissionError::Upload)?;
        rater_info!("uploaded artifact as file {}", file.id);

        rater_info!("creating batch (endpoint={}, window={})", endpoint, window);
        let job = self
            .service
            .create_batch(&file.id, endpoint, window)
            .await
            .map_err(|source| SubmissionError::Create {
                file_id: file.id.clone(),
                source,
            })?;
        rater_info!("created batch {} {}", job.id, job.progress_line());
        Ok(job)
    }

    /// Skip upload and creation; fetch the current snapshot of an existing job.
    pub async fn resume(&self, job_id: &str) -> Result<BatchJob, SubmissionError> {
        rater_info!("resuming batch {}", job_id);
        self.service
            .retrieve_batch(job_id)
            .await
            .map_err(|source| SubmissionError::Resume {
                job_id: job_id.to_string(),
                source,
            })
    }
}
