use std::fmt;

use rater_core::{BatchJob, BatchStatus, RequestCounts};

/// Coarse position of a run in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Encoding,
    BuildingArtifact,
    Uploading,
    Resuming,
    Polling,
    Downloading,
    Reconciling,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStage::Encoding => "encoding",
            RunStage::BuildingArtifact => "building artifact",
            RunStage::Uploading => "uploading",
            RunStage::Resuming => "resuming",
            RunStage::Polling => "polling",
            RunStage::Downloading => "downloading",
            RunStage::Reconciling => "reconciling",
            RunStage::Done => "done",
        };
        f.write_str(label)
    }
}

/// Status report emitted after every job query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollProgress {
    pub job_id: String,
    pub status: BatchStatus,
    pub counts: Option<RequestCounts>,
    /// 1-based number of the query that produced this snapshot.
    pub query: u32,
}

impl PollProgress {
    pub fn from_job(job: &BatchJob, query: u32) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            counts: job.request_counts,
            query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Stage(RunStage),
    Progress(PollProgress),
}
