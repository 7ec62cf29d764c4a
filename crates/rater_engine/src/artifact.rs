//! Line-delimited batch input: one self-contained JSON request per line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rater_core::{Rubric, ScoringRequest, UI_RATING_PROMPT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persist::{write_atomically, PersistError};

/// Remote endpoint every request line is routed to.
pub const DEFAULT_ENDPOINT: &str = "/v1/responses";
pub const DEFAULT_MODEL: &str = "gpt-4o";

const METHOD: &str = "POST";

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSettings {
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: UI_RATING_PROMPT.to_string(),
            temperature: 0.2,
            max_output_tokens: 400,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("cannot serialize request {custom_id}: {message}")]
    Serialization { custom_id: String, message: String },
    #[error("artifact line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("artifact contains no requests")]
    Empty,
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactRecord {
    custom_id: String,
    method: String,
    url: String,
    body: RequestBody,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestBody {
    model: String,
    input: Vec<InputMessage>,
    text: TextConfig,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct InputMessage {
    role: String,
    content: Vec<InputContent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct TextConfig {
    format: TextFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    strict: bool,
    schema: Value,
}

impl ArtifactRecord {
    fn from_request(request: &ScoringRequest, settings: &ArtifactSettings) -> Self {
        let rubric = &request.output_schema;
        Self {
            custom_id: request.custom_id.clone(),
            method: METHOD.to_string(),
            url: settings.endpoint.clone(),
            body: RequestBody {
                model: settings.model.clone(),
                input: vec![InputMessage {
                    role: "user".to_string(),
                    content: vec![
                        InputContent::InputText {
                            text: settings.prompt.clone(),
                        },
                        InputContent::InputImage {
                            image_url: request.target.clone(),
                        },
                    ],
                }],
                text: TextConfig {
                    format: TextFormat {
                        kind: "json_schema".to_string(),
                        name: rubric.name().to_string(),
                        strict: true,
                        schema: rubric.json_schema(),
                    },
                },
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            },
        }
    }

    fn into_request(self) -> Result<ScoringRequest, String> {
        let target = self
            .body
            .input
            .iter()
            .flat_map(|message| message.content.iter())
            .find_map(|part| match part {
                InputContent::InputImage { image_url } => Some(image_url.clone()),
                InputContent::InputText { .. } => None,
            })
            .ok_or_else(|| format!("request {} has no input image", self.custom_id))?;
        let format = self.body.text.format;
        let output_schema =
            Rubric::from_json_schema(format.name, &format.schema).map_err(|e| e.to_string())?;
        Ok(ScoringRequest {
            custom_id: self.custom_id,
            target,
            output_schema,
        })
    }
}

/// Serialized batch input, one line per request in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArtifact {
    lines: Vec<String>,
}

impl JobArtifact {
    /// Encode every request; any failure aborts the whole build.
    pub fn build(
        requests: &[ScoringRequest],
        settings: &ArtifactSettings,
    ) -> Result<Self, ArtifactError> {
        if requests.is_empty() {
            return Err(ArtifactError::Empty);
        }
        if !settings.temperature.is_finite() {
            return Err(ArtifactError::Serialization {
                custom_id: requests[0].custom_id.clone(),
                message: format!("temperature {} is not a finite number", settings.temperature),
            });
        }

        let lines = requests
            .iter()
            .map(|request| {
                let record = ArtifactRecord::from_request(request, settings);
                serde_json::to_string(&record).map_err(|err| ArtifactError::Serialization {
                    custom_id: request.custom_id.clone(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }

    /// Write through a temp file so a failed write never leaves a partial artifact at `path`.
    pub fn write_to(&self, path: &Path) -> Result<PathBuf, ArtifactError> {
        Ok(write_atomically(path, &self.to_bytes())?)
    }
}

/// Parse one artifact line back into the request it was built from.
pub fn parse_artifact_line(line: &str) -> Result<ScoringRequest, String> {
    let record: ArtifactRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;
    record.into_request()
}

/// Load the requests of a previously written artifact, skipping blank lines.
pub fn read_artifact(path: &Path) -> Result<Vec<ScoringRequest>, ArtifactError> {
    let text = fs::read_to_string(path)?;
    let mut requests = Vec::new();
    for (offset, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let request = parse_artifact_line(line).map_err(|message| ArtifactError::Parse {
            line: offset + 1,
            message,
        })?;
        requests.push(request);
    }
    if requests.is_empty() {
        return Err(ArtifactError::Empty);
    }
    Ok(requests)
}
