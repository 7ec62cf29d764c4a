//! Rater engine: artifact IO, the remote batch client and the job lifecycle pipeline.
mod artifact;
mod client;
mod download;
mod persist;
mod pipeline;
mod poll;
mod progress;
mod retry;
mod submit;
mod types;

pub use artifact::{
    parse_artifact_line, read_artifact, ArtifactError, ArtifactSettings, JobArtifact,
    DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
pub use client::{
    BatchService, ClientSettings, FileHandle, OpenAiBatchClient, ServiceError, ServiceErrorKind,
    DEFAULT_BASE_URL,
};
pub use download::{
    download_results, DownloadError, DownloadedArtifact, DownloadedResults, ResultPaths,
};
pub use persist::{ensure_output_dir, write_atomically, AtomicFileWriter, PersistError};
pub use pipeline::{BatchPipeline, PipelineError, PreparedBatch, RunConfig, RunReport};
pub use poll::{PollError, PollOutcome, PollSettings, Poller, StopReason};
pub use progress::{ChannelProgressSink, NullProgressSink, ProgressSink};
pub use retry::{retry_with_backoff, IsTransient, RetryPolicy, Sleeper, TokioSleeper};
pub use submit::{SubmissionError, Submitter};
pub use types::{EngineEvent, PollProgress, RunStage};
