//! One batch run: encode, build, submit, poll, download, reconcile.
//!
//! A pipeline owns nothing but its injected collaborators, so independent
//! runs can proceed side by side on separate instances.

use std::path::PathBuf;
use std::sync::Arc;

use rater_core::{
    encode_requests, reconcile, BatchJob, CompletionWindow, EncodeError, EncodeOptions,
    Reconciliation, Rubric, ScoringRequest,
};
use rater_logging::{rater_info, rater_warn};
use tokio_util::sync::CancellationToken;

use crate::artifact::{ArtifactError, ArtifactSettings, JobArtifact};
use crate::download::{download_results, DownloadError, DownloadedResults, ResultPaths};
use crate::poll::{PollError, PollSettings, Poller, StopReason};
use crate::retry::Sleeper;
use crate::submit::{SubmissionError, Submitter};
use crate::{BatchService, EngineEvent, ProgressSink, RunStage};

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub rubric: Rubric,
    pub encode: EncodeOptions,
    pub artifact: ArtifactSettings,
    pub window: CompletionWindow,
    pub poll: PollSettings,
    pub artifact_path: PathBuf,
    pub results: ResultPaths,
}

impl RunConfig {
    /// Defaults for everything, with result files saved next to `artifact_path`.
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        let artifact_path = artifact_path.into();
        Self {
            rubric: Rubric::ui_screenshots(),
            encode: EncodeOptions::default(),
            artifact: ArtifactSettings::default(),
            window: CompletionWindow::default(),
            poll: PollSettings::default(),
            results: ResultPaths::beside_artifact(&artifact_path),
            artifact_path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),
    #[error("artifact failed: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("polling failed: {0}")]
    Polling(#[from] PollError),
    #[error("result download failed: {0}")]
    Download(#[from] DownloadError),
}

/// Requests encoded and written to disk, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBatch {
    pub requests: Vec<ScoringRequest>,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub job: BatchJob,
    pub stop: StopReason,
    pub requests: usize,
    pub downloads: DownloadedResults,
    /// Present only when the job reached a terminal status.
    pub reconciliation: Option<Reconciliation>,
}

pub struct BatchPipeline {
    service: Arc<dyn BatchService>,
    sleeper: Arc<dyn Sleeper>,
    config: RunConfig,
}

impl BatchPipeline {
    /// Rejects a zero poll interval before anything is submitted.
    pub fn new(
        service: Arc<dyn BatchService>,
        sleeper: Arc<dyn Sleeper>,
        config: RunConfig,
    ) -> Result<Self, PipelineError> {
        if config.poll.interval.is_zero() {
            return Err(PollError::InvalidInterval.into());
        }
        Ok(Self {
            service,
            sleeper,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Encode `targets` and write the job artifact. No network access.
    pub fn prepare<S: AsRef<str>>(
        &self,
        targets: &[S],
        sink: &dyn ProgressSink,
    ) -> Result<PreparedBatch, PipelineError> {
        sink.emit(EngineEvent::Stage(RunStage::Encoding));
        let requests = encode_requests(targets, &self.config.rubric, self.config.encode)?;
        rater_info!("encoded {} requests", requests.len());

        sink.emit(EngineEvent::Stage(RunStage::BuildingArtifact));
        let artifact = JobArtifact::build(&requests, &self.config.artifact)?;
        let artifact_path = artifact.write_to(&self.config.artifact_path)?;
        rater_info!("wrote {} lines to {:?}", artifact.len(), artifact_path);

        Ok(PreparedBatch {
            requests,
            artifact_path,
        })
    }

    /// Full run for a fresh list of targets.
    pub async fn run<S: AsRef<str>>(
        &self,
        targets: &[S],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let prepared = self.prepare(targets, sink)?;

        sink.emit(EngineEvent::Stage(RunStage::Uploading));
        let job = Submitter::new(self.service.as_ref())
            .submit(
                &prepared.artifact_path,
                &self.config.artifact.endpoint,
                self.config.window,
            )
            .await?;

        self.track(job, prepared.requests, sink, cancel).await
    }

    /// Continue an existing job; `requests` are the ones originally submitted.
    pub async fn resume(
        &self,
        job_id: &str,
        requests: Vec<ScoringRequest>,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        sink.emit(EngineEvent::Stage(RunStage::Resuming));
        let job = Submitter::new(self.service.as_ref()).resume(job_id).await?;
        self.track(job, requests, sink, cancel).await
    }

    async fn track(
        &self,
        job: BatchJob,
        requests: Vec<ScoringRequest>,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        sink.emit(EngineEvent::Stage(RunStage::Polling));
        let poller = Poller::new(
            self.service.as_ref(),
            self.sleeper.as_ref(),
            self.config.poll.clone(),
        )?;
        let outcome = poller.poll(job, sink, cancel).await?;

        if outcome.stop != StopReason::Terminal {
            rater_warn!(
                "batch {} not finished ({:?}, last status {}); it can be resumed later",
                outcome.job.id,
                outcome.stop,
                outcome.job.status
            );
            return Ok(RunReport {
                job: outcome.job,
                stop: outcome.stop,
                requests: requests.len(),
                downloads: DownloadedResults::default(),
                reconciliation: None,
            });
        }

        for message in outcome.job.validation_messages() {
            rater_warn!("batch {}: {}", outcome.job.id, message);
        }

        sink.emit(EngineEvent::Stage(RunStage::Downloading));
        let downloads = download_results(
            self.service.as_ref(),
            self.sleeper.as_ref(),
            &self.config.poll.retry,
            &outcome.job,
            &self.config.results,
        )
        .await?;

        sink.emit(EngineEvent::Stage(RunStage::Reconciling));
        let reconciliation = reconcile(&requests, downloads.output_text(), downloads.errors_text());
        log_reconciliation(&reconciliation);

        sink.emit(EngineEvent::Stage(RunStage::Done));
        Ok(RunReport {
            job: outcome.job,
            stop: outcome.stop,
            requests: requests.len(),
            downloads,
            reconciliation: Some(reconciliation),
        })
    }
}

fn log_reconciliation(reconciliation: &Reconciliation) {
    let summary = reconciliation.summary();
    rater_info!(
        "reconciled {} requests: {} succeeded, {} failed ({} invalid), {} missing",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.invalid,
        summary.missing
    );
    for anomaly in &reconciliation.anomalies {
        rater_warn!("{}", anomaly);
    }
}
