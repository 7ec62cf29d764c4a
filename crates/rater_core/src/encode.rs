use std::collections::HashMap;

use crate::Rubric;

/// Prefix shared by every generated custom id.
pub const ID_PREFIX: &str = "ui";
/// Upper bound on the slug part of a custom id.
pub const MAX_SLUG_LEN: usize = 60;

const FALLBACK_SLUG: &str = "image";

/// One image to be scored, as it will be submitted in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringRequest {
    pub custom_id: String,
    pub target: String,
    pub output_schema: Rubric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOptions {
    /// Reject repeated targets instead of giving each copy its own id.
    pub strict_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("no targets to encode")]
    EmptyInput,
    #[error("target #{index} is blank")]
    BlankTarget { index: usize },
    #[error("target #{index} duplicates target #{first_index}: {target}")]
    DuplicateTarget {
        target: String,
        first_index: usize,
        index: usize,
    },
}

/// Turn an ordered list of targets into scoring requests.
///
/// Indices are 1-based. Every request embeds its own copy of `rubric`.
pub fn encode_requests<S: AsRef<str>>(
    targets: &[S],
    rubric: &Rubric,
    options: EncodeOptions,
) -> Result<Vec<ScoringRequest>, EncodeError> {
    if targets.is_empty() {
        return Err(EncodeError::EmptyInput);
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut requests = Vec::with_capacity(targets.len());
    for (offset, raw) in targets.iter().enumerate() {
        let index = offset + 1;
        let target = raw.as_ref().trim();
        if target.is_empty() {
            return Err(EncodeError::BlankTarget { index });
        }
        if options.strict_unique {
            if let Some(&first_index) = seen.get(target) {
                return Err(EncodeError::DuplicateTarget {
                    target: target.to_string(),
                    first_index,
                    index,
                });
            }
            seen.insert(target, index);
        }
        requests.push(ScoringRequest {
            custom_id: custom_id_for(index, target),
            target: target.to_string(),
            output_schema: rubric.clone(),
        });
    }
    Ok(requests)
}

/// Deterministic id: `ui-{index:05}-{slug}`.
pub fn custom_id_for(index: usize, target: &str) -> String {
    format!("{ID_PREFIX}-{index:05}-{}", slug_from_target(target))
}

/// Filesystem and log safe slug taken from the last path segment of `target`.
///
/// Dots are replaced too, so `a.png` becomes `a_png`.
pub fn slug_from_target(target: &str) -> String {
    let without_query = target.trim().split('?').next().unwrap_or_default();
    let segment = without_query.rsplit('/').next().unwrap_or_default();
    let segment = if segment.is_empty() {
        FALLBACK_SLUG
    } else {
        segment
    };
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_query_and_keeps_last_segment() {
        assert_eq!(
            slug_from_target("https://cdn.example.com/shots/home page.png?sig=abc/def"),
            "home_page_png"
        );
    }

    #[test]
    fn slug_falls_back_on_trailing_slash() {
        assert_eq!(slug_from_target("https://example.com/shots/"), "image");
        assert_eq!(slug_from_target("?only=query"), "image");
    }

    #[test]
    fn slug_is_capped() {
        let long = format!("https://x/{}", "a".repeat(200));
        assert_eq!(slug_from_target(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn non_ascii_becomes_underscore_per_char() {
        assert_eq!(slug_from_target("http://x/ümlaut.png"), "_mlaut_png");
    }
}
