//! Re-query a batch job until it reaches a terminal status.
//!
//! Each successful query replaces the whole snapshot. Transient query failures
//! are retried with backoff; the fixed `interval` applies only between
//! successful queries.

use std::sync::Mutex;
use std::time::Duration;

use rater_core::BatchJob;
use rater_logging::{rater_info, rater_warn};
use tokio_util::sync::CancellationToken;

use crate::retry::{retry_with_backoff, RetryPolicy, Sleeper};
use crate::{BatchService, EngineEvent, PollProgress, ProgressSink, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Wait between successful queries; must be non-zero.
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// Local ceiling on the total time spent waiting, interval sleeps and
    /// retry backoff alike. `None` leaves the bound to the service's own job expiry.
    pub max_wait: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            max_wait: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("poll interval must be greater than zero")]
    InvalidInterval,
    #[error("status query for batch {job_id} failed: {source}")]
    Query {
        job_id: String,
        #[source]
        source: ServiceError,
    },
}

/// Why polling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminal,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Last known snapshot; terminal only when `stop` is `Terminal`.
    pub job: BatchJob,
    pub stop: StopReason,
    pub queries: u32,
    /// Interval sleeps plus retry backoff.
    pub waited: Duration,
}

/// Sums the backoff waits of one retried query.
struct TallySleeper<'a> {
    inner: &'a dyn Sleeper,
    slept: Mutex<Duration>,
}

impl<'a> TallySleeper<'a> {
    fn new(inner: &'a dyn Sleeper) -> Self {
        Self {
            inner,
            slept: Mutex::new(Duration::ZERO),
        }
    }

    fn total(&self) -> Duration {
        self.slept.lock().map(|d| *d).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl<'a> Sleeper for TallySleeper<'a> {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            *slept += duration;
        }
        self.inner.sleep(duration).await;
    }
}

pub struct Poller<'a> {
    service: &'a dyn BatchService,
    sleeper: &'a dyn Sleeper,
    settings: PollSettings,
}

impl<'a> Poller<'a> {
    pub fn new(
        service: &'a dyn BatchService,
        sleeper: &'a dyn Sleeper,
        settings: PollSettings,
    ) -> Result<Self, PollError> {
        if settings.interval.is_zero() {
            return Err(PollError::InvalidInterval);
        }
        Ok(Self {
            service,
            sleeper,
            settings,
        })
    }

    /// Poll from `initial` until terminal, cancelled, or past `max_wait`.
    ///
    /// An already terminal `initial` snapshot is returned without querying.
    /// Cancellation never touches the remote job.
    pub async fn poll(
        &self,
        initial: BatchJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, PollError> {
        let job_id = initial.id.clone();
        let mut last = initial;
        let mut queries = 0u32;
        let mut waited = Duration::ZERO;

        let finish = |job: BatchJob, stop: StopReason, queries: u32, waited: Duration| PollOutcome {
            job,
            stop,
            queries,
            waited,
        };

        if last.is_terminal() {
            return Ok(finish(last, StopReason::Terminal, queries, waited));
        }

        loop {
            let backoff = TallySleeper::new(self.sleeper);
            let queried = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = retry_with_backoff(&self.settings.retry, &backoff, || {
                    self.service.retrieve_batch(&job_id)
                }) => Some(result),
            };
            waited += backoff.total();
            let Some(result) = queried else {
                rater_warn!("polling of batch {} cancelled; last status {}", job_id, last.status);
                return Ok(finish(last, StopReason::Cancelled, queries, waited));
            };
            let job = result.map_err(|source| PollError::Query {
                job_id: job_id.clone(),
                source,
            })?;

            queries += 1;
            rater_info!("batch {} {}", job.id, job.progress_line());
            sink.emit(EngineEvent::Progress(PollProgress::from_job(&job, queries)));
            last = job;

            if last.is_terminal() {
                return Ok(finish(last, StopReason::Terminal, queries, waited));
            }

            let interval = self.settings.interval;
            if let Some(max_wait) = self.settings.max_wait {
                if waited + interval > max_wait {
                    rater_warn!(
                        "batch {} still {} after waiting {:?}; giving up locally",
                        job_id,
                        last.status,
                        waited
                    );
                    return Ok(finish(last, StopReason::DeadlineExceeded, queries, waited));
                }
            }

            let slept = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.sleeper.sleep(interval) => true,
            };
            if !slept {
                rater_warn!("polling of batch {} cancelled; last status {}", job_id, last.status);
                return Ok(finish(last, StopReason::Cancelled, queries, waited));
            }
            waited += interval;
        }
    }
}
