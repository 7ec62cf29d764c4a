//! Matching every submitted request to exactly one outcome.
//!
//! Result artifacts are line-delimited JSON records keyed by `custom_id`.
//! Each line is handled on its own: a bad line becomes data (a failed result
//! or an anomaly), never an error that stops the rest of the batch.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::{ScoringRequest, Scores};

/// Which downloaded artifact a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Output,
    Errors,
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Output => write!(f, "output"),
            ArtifactSource::Errors => write!(f, "errors"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    /// No record in either artifact.
    Missing,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingResult {
    pub custom_id: String,
    pub target: String,
    pub outcome: Outcome,
    /// Populated only for `Outcome::Success`.
    pub scores: Scores,
    pub parse_ok: bool,
    pub error: Option<String>,
}

impl RatingResult {
    fn success(request: &ScoringRequest, scores: Scores) -> Self {
        Self {
            custom_id: request.custom_id.clone(),
            target: request.target.clone(),
            outcome: Outcome::Success,
            scores,
            parse_ok: true,
            error: None,
        }
    }

    fn failed(request: &ScoringRequest, parse_ok: bool, error: impl Into<String>) -> Self {
        Self {
            custom_id: request.custom_id.clone(),
            target: request.target.clone(),
            outcome: Outcome::Failed,
            scores: Scores::new(),
            parse_ok,
            error: Some(error.into()),
        }
    }

    fn missing(request: &ScoringRequest) -> Self {
        Self {
            custom_id: request.custom_id.clone(),
            target: request.target.clone(),
            outcome: Outcome::Missing,
            scores: Scores::new(),
            parse_ok: false,
            error: Some("no result record".to_string()),
        }
    }
}

/// A result line that could not be attached to exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Line is not JSON or carries no `custom_id`.
    Unattributed {
        source: ArtifactSource,
        line: usize,
        message: String,
    },
    UnknownCustomId {
        source: ArtifactSource,
        line: usize,
        custom_id: String,
    },
    /// A later record for an id that already has an outcome; the first one wins.
    DuplicateRecord {
        source: ArtifactSource,
        line: usize,
        custom_id: String,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Unattributed {
                source,
                line,
                message,
            } => write!(f, "{source} line {line}: unattributed record ({message})"),
            Anomaly::UnknownCustomId {
                source,
                line,
                custom_id,
            } => write!(f, "{source} line {line}: unknown custom_id {custom_id}"),
            Anomaly::DuplicateRecord {
                source,
                line,
                custom_id,
            } => write!(f, "{source} line {line}: duplicate record for {custom_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub missing: usize,
    /// Results whose record could not be parsed or validated.
    pub invalid: usize,
    pub anomalies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// One entry per submitted request, in request order.
    pub results: Vec<RatingResult>,
    pub anomalies: Vec<Anomaly>,
}

impl Reconciliation {
    pub fn summary(&self) -> ReconciliationSummary {
        let mut summary = ReconciliationSummary {
            total: self.results.len(),
            anomalies: self.anomalies.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.outcome {
                Outcome::Success => summary.succeeded += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Missing => summary.missing += 1,
            }
            if !result.parse_ok && result.outcome != Outcome::Missing {
                summary.invalid += 1;
            }
        }
        summary
    }

    pub fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &RatingResult> {
        self.results.iter().filter(move |r| r.outcome == outcome)
    }

    pub fn get(&self, custom_id: &str) -> Option<&RatingResult> {
        self.results.iter().find(|r| r.custom_id == custom_id)
    }
}

/// Cross-reference downloaded result artifacts against the submitted requests.
///
/// Every request gets exactly one result; the output artifact is read before the
/// error artifact, so an id present in both keeps its output record.
pub fn reconcile(
    requests: &[ScoringRequest],
    output: Option<&str>,
    errors: Option<&str>,
) -> Reconciliation {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(requests.len());
    for (pos, request) in requests.iter().enumerate() {
        index.entry(request.custom_id.as_str()).or_insert(pos);
    }

    let mut slots: Vec<Option<RatingResult>> = vec![None; requests.len()];
    let mut anomalies = Vec::new();

    let artifacts = [
        (ArtifactSource::Output, output),
        (ArtifactSource::Errors, errors),
    ];
    for (source, text) in artifacts {
        let Some(text) = text else { continue };
        for (offset, raw) in text.lines().enumerate() {
            let line = offset + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(err) => {
                    anomalies.push(Anomaly::Unattributed {
                        source,
                        line,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let Some(custom_id) = value.get("custom_id").and_then(Value::as_str) else {
                anomalies.push(Anomaly::Unattributed {
                    source,
                    line,
                    message: "record has no custom_id".to_string(),
                });
                continue;
            };
            let Some(&pos) = index.get(custom_id) else {
                anomalies.push(Anomaly::UnknownCustomId {
                    source,
                    line,
                    custom_id: custom_id.to_string(),
                });
                continue;
            };
            if slots[pos].is_some() {
                anomalies.push(Anomaly::DuplicateRecord {
                    source,
                    line,
                    custom_id: custom_id.to_string(),
                });
                continue;
            }
            slots[pos] = Some(classify(&requests[pos], source, value));
        }
    }

    let results = requests
        .iter()
        .zip(slots)
        .map(|(request, slot)| slot.unwrap_or_else(|| RatingResult::missing(request)))
        .collect();

    Reconciliation { results, anomalies }
}

#[derive(Debug, Deserialize)]
struct ResultRecord {
    #[serde(default)]
    response: Option<ResponseEnvelope>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    status_code: u16,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RemoteError {
    fn describe(&self) -> String {
        match (self.code.as_deref(), self.message.as_deref()) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.to_string(),
            (None, Some(message)) => message.to_string(),
            (None, None) => "unspecified remote error".to_string(),
        }
    }
}

fn classify(request: &ScoringRequest, source: ArtifactSource, value: Value) -> RatingResult {
    let record: ResultRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(err) => {
            return RatingResult::failed(request, false, format!("malformed result record: {err}"))
        }
    };

    if let Some(error) = &record.error {
        return RatingResult::failed(request, true, error.describe());
    }

    let Some(response) = record.response else {
        return match source {
            ArtifactSource::Errors => {
                RatingResult::failed(request, true, "listed in error artifact")
            }
            ArtifactSource::Output => {
                RatingResult::failed(request, false, "result record has no response")
            }
        };
    };

    if !(200..300).contains(&response.status_code) {
        let reason = response
            .body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("http status {}", response.status_code));
        return RatingResult::failed(request, true, reason);
    }

    if source == ArtifactSource::Errors {
        return RatingResult::failed(request, true, "listed in error artifact");
    }

    let text = match extract_output_text(&response.body) {
        Ok(text) => text,
        Err(reason) => return RatingResult::failed(request, false, reason),
    };
    match request.output_schema.parse_scores(&text) {
        Ok(scores) => RatingResult::success(request, scores),
        Err(err) => RatingResult::failed(request, false, err.to_string()),
    }
}

/// Pull the model's reply out of a Responses API or Chat Completions body.
fn extract_output_text(body: &Value) -> Result<String, String> {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }

    if let Some(items) = body.get("output").and_then(Value::as_array) {
        let mut text = String::new();
        let parts = items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten();
        for part in parts {
            match part.get("type").and_then(Value::as_str) {
                Some("output_text") => {
                    if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                        text.push_str(chunk);
                    }
                }
                Some("refusal") => {
                    let refusal = part
                        .get("refusal")
                        .and_then(Value::as_str)
                        .unwrap_or("no reason given");
                    return Err(format!("model refused: {refusal}"));
                }
                _ => {}
            }
        }
        if !text.is_empty() {
            return Ok(text);
        }
    }

    if let Some(message) = body.pointer("/choices/0/message") {
        if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
            return Err(format!("model refused: {refusal}"));
        }
        if let Some(text) = message.get("content").and_then(Value::as_str) {
            return Ok(text.to_string());
        }
    }

    if body.get("status").and_then(Value::as_str) == Some("incomplete") {
        let reason = body
            .pointer("/incomplete_details/reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(format!("response incomplete: {reason}"));
    }
    Err("response contained no output text".to_string())
}
