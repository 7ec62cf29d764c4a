use pretty_assertions::assert_eq;
use rater_core::{
    encode_requests, reconcile, Anomaly, ArtifactSource, EncodeOptions, Outcome, Rubric,
    ScoringRequest,
};
use serde_json::json;

fn requests(n: usize) -> Vec<ScoringRequest> {
    let targets: Vec<String> = (1..=n).map(|i| format!("https://x/shot{i}.png")).collect();
    encode_requests(&targets, &Rubric::new("Pair", ["a", "b"]), EncodeOptions::default()).unwrap()
}

fn output_line(custom_id: &str, reply: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": {
            "status_code": 200,
            "request_id": "req_1",
            "body": {
                "status": "completed",
                "output": [{
                    "type": "message",
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": reply }]
                }]
            }
        },
        "error": null
    })
    .to_string()
}

fn error_line(custom_id: &str, code: &str, message: &str) -> String {
    json!({
        "id": format!("batch_req_{custom_id}"),
        "custom_id": custom_id,
        "response": null,
        "error": { "code": code, "message": message }
    })
    .to_string()
}

#[test]
fn missing_record_is_reported_and_count_is_preserved() {
    let reqs = requests(3);
    let output = [
        output_line(&reqs[0].custom_id, r#"{"a":3,"b":4}"#),
        output_line(&reqs[2].custom_id, r#"{"a":9,"b":1}"#),
    ]
    .join("\n");

    let rec = reconcile(&reqs, Some(&output), None);

    assert_eq!(rec.results.len(), 3);
    assert_eq!(rec.results[1].custom_id, reqs[1].custom_id);
    assert_eq!(rec.results[1].outcome, Outcome::Missing);
    assert!(!rec.results[1].parse_ok);

    let summary = rec.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.failed, 0);
}

#[test]
fn success_and_error_artifacts_are_unioned() {
    let reqs = requests(3);
    let output = output_line(&reqs[0].custom_id, r#"{"a":3,"b":4}"#);
    let errors = [
        error_line(&reqs[1].custom_id, "invalid_image_url", "could not download"),
        error_line(&reqs[2].custom_id, "rate_limit", "slow down"),
    ]
    .join("\n");

    let rec = reconcile(&reqs, Some(&output), Some(&errors));

    let outcomes: Vec<_> = rec.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![Outcome::Success, Outcome::Failed, Outcome::Failed]
    );
    assert_eq!(rec.results[0].scores.get("a"), Some(&3));
    assert_eq!(
        rec.results[1].error.as_deref(),
        Some("invalid_image_url: could not download")
    );
    assert!(rec.results[1].parse_ok);
    assert!(rec.anomalies.is_empty());
}

#[test]
fn malformed_lines_do_not_abort_the_rest() {
    let reqs = requests(3);
    let output = [
        "{not json".to_string(),
        output_line(&reqs[0].custom_id, r#"{"a":3,"b":4}"#),
        json!({ "custom_id": reqs[1].custom_id, "response": { "status_code": "two hundred" } })
            .to_string(),
        String::new(),
        output_line(&reqs[2].custom_id, r#"{"a":5,"b":5}"#),
    ]
    .join("\n");

    let rec = reconcile(&reqs, Some(&output), None);

    assert_eq!(rec.results[0].outcome, Outcome::Success);
    assert_eq!(rec.results[1].outcome, Outcome::Failed);
    assert!(!rec.results[1].parse_ok);
    assert!(rec.results[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("malformed result record"));
    assert_eq!(rec.results[2].outcome, Outcome::Success);

    assert_eq!(rec.anomalies.len(), 1);
    assert!(matches!(
        rec.anomalies[0],
        Anomaly::Unattributed {
            source: ArtifactSource::Output,
            line: 1,
            ..
        }
    ));
    assert_eq!(rec.summary().invalid, 1);
}

#[test]
fn out_of_range_scores_are_failed_not_clamped() {
    let reqs = requests(2);
    let output = [
        output_line(&reqs[0].custom_id, r#"{"a":11,"b":4}"#),
        output_line(&reqs[1].custom_id, r#"{"a":2.5,"b":4}"#),
    ]
    .join("\n");

    let rec = reconcile(&reqs, Some(&output), None);

    for result in &rec.results {
        assert_eq!(result.outcome, Outcome::Failed);
        assert!(!result.parse_ok);
        assert!(result.scores.is_empty());
    }
}

#[test]
fn successful_scores_are_within_bounds() {
    let reqs = requests(4);
    let output = reqs
        .iter()
        .enumerate()
        .map(|(i, r)| output_line(&r.custom_id, &format!(r#"{{"a":{},"b":{}}}"#, i + 1, 10 - i)))
        .collect::<Vec<_>>()
        .join("\n");

    let rec = reconcile(&reqs, Some(&output), None);

    assert_eq!(rec.summary().succeeded, 4);
    for result in rec.with_outcome(Outcome::Success) {
        assert!(result.scores.values().all(|v| (1..=10).contains(v)));
    }
}

#[test]
fn non_success_status_uses_remote_reason() {
    let reqs = requests(1);
    let output = json!({
        "custom_id": reqs[0].custom_id,
        "response": {
            "status_code": 400,
            "body": { "error": { "message": "Invalid image", "type": "invalid_request_error" } }
        },
        "error": null
    })
    .to_string();

    let rec = reconcile(&reqs, Some(&output), None);

    assert_eq!(rec.results[0].outcome, Outcome::Failed);
    assert_eq!(rec.results[0].error.as_deref(), Some("Invalid image"));
    assert!(rec.results[0].parse_ok);
}

#[test]
fn unknown_and_duplicate_ids_are_anomalies() {
    let reqs = requests(1);
    let output = [
        output_line(&reqs[0].custom_id, r#"{"a":3,"b":4}"#),
        output_line("ui-99999-ghost.png", r#"{"a":3,"b":4}"#),
    ]
    .join("\n");
    let errors = error_line(&reqs[0].custom_id, "server_error", "boom");

    let rec = reconcile(&reqs, Some(&output), Some(&errors));

    assert_eq!(rec.results.len(), 1);
    assert_eq!(rec.results[0].outcome, Outcome::Success);
    assert_eq!(
        rec.anomalies,
        vec![
            Anomaly::UnknownCustomId {
                source: ArtifactSource::Output,
                line: 2,
                custom_id: "ui-99999-ghost.png".to_string(),
            },
            Anomaly::DuplicateRecord {
                source: ArtifactSource::Errors,
                line: 1,
                custom_id: reqs[0].custom_id.clone(),
            },
        ]
    );
}

#[test]
fn no_artifacts_means_everything_missing() {
    let reqs = requests(5);
    let rec = reconcile(&reqs, None, None);
    assert_eq!(rec.results.len(), 5);
    assert!(rec.results.iter().all(|r| r.outcome == Outcome::Missing));
    assert_eq!(rec.summary().missing, 5);
    assert_eq!(rec.summary().invalid, 0);
}

#[test]
fn every_request_has_exactly_one_outcome() {
    let reqs = requests(6);
    let output = [
        output_line(&reqs[0].custom_id, r#"{"a":1,"b":1}"#),
        output_line(&reqs[1].custom_id, "not json at all"),
        output_line(&reqs[0].custom_id, r#"{"a":2,"b":2}"#),
    ]
    .join("\n");
    let errors = [
        error_line(&reqs[2].custom_id, "x", "y"),
        error_line(&reqs[3].custom_id, "x", "y"),
    ]
    .join("\n");

    let rec = reconcile(&reqs, Some(&output), Some(&errors));

    assert_eq!(rec.results.len(), reqs.len());
    for request in &reqs {
        let matching = rec
            .results
            .iter()
            .filter(|r| r.custom_id == request.custom_id)
            .count();
        assert_eq!(matching, 1, "{}", request.custom_id);
    }
    let summary = rec.summary();
    assert_eq!(
        summary.succeeded + summary.failed + summary.missing,
        summary.total
    );
    assert_eq!(rec.get(&reqs[0].custom_id).unwrap().scores.get("a"), Some(&1));
}
