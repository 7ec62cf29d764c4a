//! Rater core: pure request encoding, batch job model and result reconciliation.
mod encode;
mod job;
mod reconcile;
mod rubric;

pub use encode::{
    custom_id_for, encode_requests, slug_from_target, EncodeError, EncodeOptions, ScoringRequest,
    ID_PREFIX, MAX_SLUG_LEN,
};
pub use job::{
    BatchJob, BatchStatus, CompletionWindow, JobErrorEntry, JobErrors, RequestCounts, UnknownWindow,
};
pub use reconcile::{
    reconcile, Anomaly, ArtifactSource, Outcome, RatingResult, Reconciliation,
    ReconciliationSummary,
};
pub use rubric::{Rubric, ScoreError, Scores, SCORE_MAX, SCORE_MIN, UI_RATING_PROMPT};
