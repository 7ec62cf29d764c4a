use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Remote batch status. Anything the service reports that we do not know maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[serde(alias = "submitted")]
    Validating,
    InProgress,
    Finalizing,
    Cancelling,
    Completed,
    Failed,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// No further transition happens once a job reports a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Cancelling => "cancelling",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobErrors {
    #[serde(default)]
    pub data: Vec<JobErrorEntry>,
}

/// Validation problem the service reported against the uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobErrorEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
}

/// Snapshot of a remote batch job. Replaced wholesale on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
    #[serde(default)]
    pub input_file_id: Option<String>,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub errors: Option<JobErrors>,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, status: BatchStatus) -> Self {
        Self {
            id: id.into(),
            status,
            request_counts: None,
            input_file_id: None,
            output_file_id: None,
            error_file_id: None,
            errors: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// One-line progress summary, e.g. `[in_progress] total=10 completed=4 failed=1`.
    pub fn progress_line(&self) -> String {
        match self.request_counts {
            Some(counts) => format!(
                "[{}] total={} completed={} failed={}",
                self.status, counts.total, counts.completed, counts.failed
            ),
            None => format!("[{}]", self.status),
        }
    }

    pub fn validation_messages(&self) -> Vec<String> {
        let Some(errors) = &self.errors else {
            return Vec::new();
        };
        errors
            .data
            .iter()
            .map(|entry| {
                let code = entry.code.as_deref().unwrap_or("error");
                let message = entry.message.as_deref().unwrap_or("no message");
                match entry.line {
                    Some(line) => format!("line {line}: {code}: {message}"),
                    None => format!("{code}: {message}"),
                }
            })
            .collect()
    }
}

/// How long the service may take to finish the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionWindow {
    #[default]
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "48h")]
    Hours48,
}

impl CompletionWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionWindow::Hours24 => "24h",
            CompletionWindow::Hours48 => "48h",
        }
    }
}

impl fmt::Display for CompletionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported completion window `{0}` (expected 24h or 48h)")]
pub struct UnknownWindow(pub String);

impl FromStr for CompletionWindow {
    type Err = UnknownWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "24h" => Ok(CompletionWindow::Hours24),
            "48h" => Ok(CompletionWindow::Hours48),
            other => Err(UnknownWindow(other.to_string())),
        }
    }
}
