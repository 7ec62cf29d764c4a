#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, Once};
use std::time::Duration;

use rater_core::{BatchJob, BatchStatus, CompletionWindow, RequestCounts};
use rater_engine::{
    BatchService, EngineEvent, FileHandle, ProgressSink, ServiceError, ServiceErrorKind, Sleeper,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub const JOB_ID: &str = "batch_test";
pub const INPUT_FILE_ID: &str = "file-input";

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(rater_logging::initialize_for_tests);
}

/// In-memory batch service that plays back a canned sequence of job snapshots.
pub struct StubService {
    snapshots: Mutex<VecDeque<Result<BatchJob, ServiceError>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<Vec<u8>>>,
}

impl StubService {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(VecDeque::new()),
            files: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, job: BatchJob) -> Self {
        self.snapshots.lock().unwrap().push_back(Ok(job));
        self
    }

    pub fn then_fail(self, error: ServiceError) -> Self {
        self.snapshots.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_file(self, file_id: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), content.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        self.uploaded.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl BatchService for StubService {
    async fn upload_file(
        &self,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, ServiceError> {
        self.record(format!("upload:{filename}"));
        let bytes = content.len() as u64;
        self.uploaded.lock().unwrap().push(content);
        Ok(FileHandle {
            id: INPUT_FILE_ID.to_string(),
            bytes: Some(bytes),
            filename: Some(filename.to_string()),
        })
    }

    async fn create_batch(
        &self,
        input_file_id: &str,
        endpoint: &str,
        window: CompletionWindow,
    ) -> Result<BatchJob, ServiceError> {
        self.record(format!("create:{input_file_id}:{endpoint}:{window}"));
        let mut job = BatchJob::new(JOB_ID, BatchStatus::Validating);
        job.input_file_id = Some(input_file_id.to_string());
        Ok(job)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, ServiceError> {
        self.record(format!("retrieve:{batch_id}"));
        self.snapshots.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ServiceError::new(
                ServiceErrorKind::HttpStatus(410),
                "stub ran out of snapshots",
            ))
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ServiceError> {
        self.record(format!("download:{file_id}"));
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| ServiceError::new(ServiceErrorKind::HttpStatus(404), "no such file"))
    }
}

/// Records requested waits and returns at once; optionally cancels on the n-th wait.
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
    cancel_on: Option<(usize, CancellationToken)>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
            cancel_on: None,
        }
    }

    pub fn cancelling_on(nth: usize, token: CancellationToken) -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
            cancel_on: Some((nth, token)),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut slept = self.slept.lock().unwrap();
            slept.push(duration);
            slept.len()
        };
        if let Some((nth, token)) = &self.cancel_on {
            if count == *nth {
                token.cancel();
            }
        }
    }
}

#[derive(Default)]
pub struct TestSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn snapshot(status: BatchStatus, total: u64, completed: u64, failed: u64) -> BatchJob {
    let mut job = BatchJob::new(JOB_ID, status);
    job.request_counts = Some(RequestCounts {
        total,
        completed,
        failed,
    });
    job
}

pub fn completed_with(output: Option<&str>, errors: Option<&str>) -> BatchJob {
    let mut job = snapshot(BatchStatus::Completed, 0, 0, 0);
    job.output_file_id = output.map(str::to_string);
    job.error_file_id = errors.map(str::to_string);
    job
}

pub fn transient() -> ServiceError {
    ServiceError::new(ServiceErrorKind::Network, "connection reset")
}

/// A successful Responses API result line carrying `reply` as the model text.
pub fn output_line(custom_id: &str, reply: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": {
            "status_code": 200,
            "body": {
                "output": [{
                    "type": "message",
                    "content": [{ "type": "output_text", "text": reply }]
                }]
            }
        },
        "error": null
    })
    .to_string()
}

pub fn error_line(custom_id: &str, message: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": null,
        "error": { "code": "invalid_request", "message": message }
    })
    .to_string()
}

pub const FULL_SCORES: &str = r#"{"aesthetics":7,"level_of_detail":6,"utility_for_designer":8,"orderliness":7,"complexity":4,"overall":7}"#;
