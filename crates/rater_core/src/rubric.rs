use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Lowest score a dimension may take.
pub const SCORE_MIN: i64 = 1;
/// Highest score a dimension may take.
pub const SCORE_MAX: i64 = 10;

/// Validated scores keyed by dimension name.
pub type Scores = BTreeMap<String, u8>;

/// Instruction text sent alongside every screenshot.
pub const UI_RATING_PROMPT: &str = "Rate the UI screenshot on six integer scales from 1 to 10. \
aesthetics: visual quality of layout, color, typography and polish; avoid high scores for flat or noisy designs. \
level_of_detail: richness and structure of components and their organization; be forgiving with sparse drafts and lightly penalize repetition. \
utility_for_designer: usefulness as design inspiration, based on aesthetics and detail but adjusted for clarity and layout richness. \
orderliness: how orderly the UI appears. \
complexity: how visually complex the UI appears. \
overall: the overall quality of the design. \
Return only the numbers, no explanations.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("missing dimension `{0}`")]
    MissingDimension(String),
    #[error("unexpected field `{0}`")]
    UnexpectedField(String),
    #[error("dimension `{dimension}` is not an integer: {value}")]
    NotInteger { dimension: String, value: String },
    #[error("dimension `{dimension}` out of range [1, 10]: {value}")]
    OutOfRange { dimension: String, value: String },
    #[error("invalid output schema: {0}")]
    InvalidSchema(String),
}

/// The scoring rubric: one definition shared by request building and result validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    name: String,
    dimensions: Vec<String>,
}

impl Rubric {
    pub fn new<I, S>(name: impl Into<String>, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
        }
    }

    /// The six-dimension rubric used for UI screenshots.
    pub fn ui_screenshots() -> Self {
        Self::new(
            "UIRatings",
            [
                "aesthetics",
                "level_of_detail",
                "utility_for_designer",
                "orderliness",
                "complexity",
                "overall",
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Structured-output schema: closed object, every dimension a required bounded integer.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for dimension in &self.dimensions {
            properties.insert(
                dimension.clone(),
                json!({ "type": "integer", "minimum": SCORE_MIN, "maximum": SCORE_MAX }),
            );
        }
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": properties,
            "required": self.dimensions,
        })
    }

    /// Rebuild a rubric from a schema produced by [`Rubric::json_schema`].
    ///
    /// Dimension order follows the schema's `required` list.
    pub fn from_json_schema(name: impl Into<String>, schema: &Value) -> Result<Self, ScoreError> {
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .ok_or_else(|| ScoreError::InvalidSchema("missing `required` list".into()))?;
        let mut dimensions = Vec::with_capacity(required.len());
        for entry in required {
            let dimension = entry
                .as_str()
                .ok_or_else(|| ScoreError::InvalidSchema("non-string entry in `required`".into()))?;
            dimensions.push(dimension.to_string());
        }
        if dimensions.is_empty() {
            return Err(ScoreError::InvalidSchema("no dimensions".into()));
        }
        Ok(Self {
            name: name.into(),
            dimensions,
        })
    }

    /// Parse a model reply (optionally wrapped in a markdown code fence) into scores.
    pub fn parse_scores(&self, text: &str) -> Result<Scores, ScoreError> {
        let value: Value = serde_json::from_str(strip_code_fence(text))
            .map_err(|err| ScoreError::NotJson(err.to_string()))?;
        self.validate(&value)
    }

    /// Check a decoded reply against the rubric. Values are never clamped.
    pub fn validate(&self, value: &Value) -> Result<Scores, ScoreError> {
        let object = value.as_object().ok_or(ScoreError::NotAnObject)?;

        if let Some(extra) = object
            .keys()
            .find(|key| !self.dimensions.iter().any(|d| d == *key))
        {
            return Err(ScoreError::UnexpectedField(extra.clone()));
        }

        let mut scores = Scores::new();
        for dimension in &self.dimensions {
            let raw = object
                .get(dimension)
                .ok_or_else(|| ScoreError::MissingDimension(dimension.clone()))?;
            scores.insert(dimension.clone(), score_value(dimension, raw)?);
        }
        Ok(scores)
    }
}

fn score_value(dimension: &str, raw: &Value) -> Result<u8, ScoreError> {
    let not_integer = || ScoreError::NotInteger {
        dimension: dimension.to_string(),
        value: raw.to_string(),
    };
    let Value::Number(number) = raw else {
        return Err(not_integer());
    };
    if !(number.is_i64() || number.is_u64()) {
        return Err(not_integer());
    }
    match number.as_i64() {
        Some(v) if (SCORE_MIN..=SCORE_MAX).contains(&v) => Ok(v as u8),
        _ => Err(ScoreError::OutOfRange {
            dimension: dimension.to_string(),
            value: number.to_string(),
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop a language tag such as `json` on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) if rest[..pos].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[pos + 1..]
        }
        _ => rest,
    };
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn float_scores_are_not_integers() {
        let err = score_value("overall", &json!(7.0)).unwrap_err();
        assert!(matches!(err, ScoreError::NotInteger { .. }));
    }

    #[test]
    fn huge_scores_are_out_of_range() {
        let err = score_value("overall", &json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, ScoreError::OutOfRange { .. }));
    }
}
