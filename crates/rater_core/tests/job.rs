use pretty_assertions::assert_eq;
use rater_core::{BatchJob, BatchStatus, CompletionWindow, RequestCounts};

#[test]
fn terminal_statuses() {
    let terminal: Vec<_> = [
        BatchStatus::Validating,
        BatchStatus::InProgress,
        BatchStatus::Finalizing,
        BatchStatus::Cancelling,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Expired,
        BatchStatus::Cancelled,
        BatchStatus::Unknown,
    ]
    .into_iter()
    .filter(|s| s.is_terminal())
    .collect();
    assert_eq!(
        terminal,
        vec![
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::Expired,
            BatchStatus::Cancelled,
        ]
    );
}

#[test]
fn job_snapshot_deserializes_from_service_json() {
    let raw = r#"{
        "id": "batch_abc",
        "object": "batch",
        "endpoint": "/v1/responses",
        "errors": null,
        "input_file_id": "file-in",
        "completion_window": "24h",
        "status": "completed",
        "output_file_id": "file-out",
        "error_file_id": null,
        "created_at": 1714508499,
        "request_counts": { "total": 3, "completed": 2, "failed": 1 }
    }"#;
    let job: BatchJob = serde_json::from_str(raw).unwrap();

    assert_eq!(job.id, "batch_abc");
    assert_eq!(job.status, BatchStatus::Completed);
    assert!(job.is_terminal());
    assert_eq!(
        job.request_counts,
        Some(RequestCounts {
            total: 3,
            completed: 2,
            failed: 1
        })
    );
    assert_eq!(job.output_file_id.as_deref(), Some("file-out"));
    assert_eq!(job.error_file_id, None);
    assert_eq!(
        job.progress_line(),
        "[completed] total=3 completed=2 failed=1"
    );
}

#[test]
fn unknown_and_submitted_statuses_are_non_terminal() {
    let job: BatchJob = serde_json::from_str(r#"{"id":"b","status":"rehydrating"}"#).unwrap();
    assert_eq!(job.status, BatchStatus::Unknown);
    assert!(!job.is_terminal());
    assert_eq!(job.progress_line(), "[unknown]");

    let job: BatchJob = serde_json::from_str(r#"{"id":"b","status":"submitted"}"#).unwrap();
    assert_eq!(job.status, BatchStatus::Validating);
}

#[test]
fn validation_errors_are_rendered() {
    let raw = r#"{
        "id": "batch_bad",
        "status": "failed",
        "errors": { "object": "list", "data": [
            { "code": "invalid_json_line", "message": "bad line", "line": 4, "param": null },
            { "message": "no code" }
        ]}
    }"#;
    let job: BatchJob = serde_json::from_str(raw).unwrap();
    assert_eq!(
        job.validation_messages(),
        vec![
            "line 4: invalid_json_line: bad line".to_string(),
            "error: no code".to_string(),
        ]
    );
}

#[test]
fn completion_window_parses_enumerated_values_only() {
    assert_eq!("24h".parse::<CompletionWindow>().unwrap(), CompletionWindow::Hours24);
    assert_eq!("48h".parse::<CompletionWindow>().unwrap(), CompletionWindow::Hours48);
    assert!("12h".parse::<CompletionWindow>().is_err());
    assert_eq!(CompletionWindow::default().to_string(), "24h");
}
