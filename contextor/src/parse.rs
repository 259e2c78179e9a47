//! Strict parsing of the synthesis reply.
//!
//! The model returns free text expected to hold exactly one JSON object. The
//! first balanced object is extracted and validated field by field; valid JSON
//! alone is not trusted.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::warn;

use crate::api_types::{SourceRef, UsedChunk};
use crate::error::ContextorError;
use crate::score::excerpt;

const EXCERPT_CHARS: usize = 200;

/// Validated fields of a synthesis object.
#[derive(Clone, Debug, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence_explanation: Option<String>,
    pub clarifying_question: Option<String>,
}

/// Parses `raw` against the schema. Sources are only kept when they cite one
/// of `supplied`.
///
/// # Errors
/// `ContextorError::SynthesisParse` when no object is found, it is not valid
/// JSON, or `answer` is missing or empty.
pub fn parse_synthesis(raw: &str, supplied: &[UsedChunk]) -> Result<Synthesis, ContextorError> {
    let cleaned = strip_think(raw);
    let obj_text = first_json_object(&cleaned)
        .ok_or_else(|| ContextorError::SynthesisParse("no JSON object in reply".into()))?;
    let value: Value = serde_json::from_str(obj_text)
        .map_err(|e| ContextorError::SynthesisParse(format!("invalid JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(ContextorError::SynthesisParse("top level is not an object".into()));
    };

    let answer = match map.get("answer") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => {
            return Err(ContextorError::SynthesisParse(
                "`answer` must be a non-empty string".into(),
            ));
        }
        None => return Err(ContextorError::SynthesisParse("missing `answer`".into())),
    };

    let known: BTreeSet<(String, u64)> = supplied
        .iter()
        .map(|c| (c.file_name.clone(), c.chunk_id))
        .collect();

    let sources = match map.get("sources") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match source_ref(item, &known) {
                Ok(s) => Some(s),
                Err(reason) => {
                    warn!(%reason, "dropping invalid source entry");
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            warn!("`sources` is not an array, ignoring");
            Vec::new()
        }
    };

    Ok(Synthesis {
        answer,
        sources,
        confidence_explanation: opt_string(&map, "confidence_explanation"),
        clarifying_question: opt_string(&map, "clarifying_question"),
    })
}

fn opt_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => None,
        Some(_) => {
            warn!(key, "expected a string, ignoring");
            None
        }
    }
}

fn source_ref(item: &Value, known: &BTreeSet<(String, u64)>) -> Result<SourceRef, String> {
    let obj = item.as_object().ok_or("not an object")?;
    let file_name = obj
        .get("file_name")
        .and_then(Value::as_str)
        .ok_or("file_name must be a string")?
        .to_string();
    let chunk_id = obj
        .get("chunk_id")
        .and_then(Value::as_u64)
        .ok_or("chunk_id must be a non-negative integer")?;
    let score = obj
        .get("score")
        .and_then(Value::as_f64)
        .ok_or("score must be a number")?;
    if !(0.0..=1.0).contains(&score) {
        return Err(format!("score {score} out of [0, 1]"));
    }
    let excerpt_text = match obj.get("excerpt") {
        Some(Value::String(s)) => excerpt(s, EXCERPT_CHARS),
        None | Some(Value::Null) => String::new(),
        Some(_) => return Err("excerpt must be a string".into()),
    };
    if !known.contains(&(file_name.clone(), chunk_id)) {
        return Err(format!("{file_name}#{chunk_id} was not supplied as context"));
    }
    Ok(SourceRef {
        file_name,
        chunk_id,
        score: score as f32,
        excerpt: excerpt_text,
    })
}

/// Removes `<think>...</think>` blocks some reasoning models emit.
fn strip_think(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// First balanced `{...}` in `s`, honoring string literals and escapes.
pub fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;

    for (i, ch) in s[start..].char_indices() {
        if in_str {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supplied() -> Vec<UsedChunk> {
        vec![UsedChunk {
            file_id: "1".into(),
            file_name: "policy.pdf".into(),
            chunk_id: 2,
            score: 0.9,
            text: "Remote work needs manager approval.".into(),
        }]
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let raw = r#"Sure! {"answer": "Yes {really}", "x": "\"}"} trailing"#;
        assert_eq!(
            first_json_object(raw),
            Some(r#"{"answer": "Yes {really}", "x": "\"}"}"#)
        );
        assert_eq!(first_json_object("no braces"), None);
        assert_eq!(first_json_object("{ unterminated"), None);
    }

    #[test]
    fn valid_reply_is_parsed_and_sources_checked() {
        let raw = r#"<think>hmm {not this}</think>
        {"answer": "Approval is required [policy.pdf#2].",
         "sources": [
            {"file_name": "policy.pdf", "chunk_id": 2, "score": 0.9, "excerpt": "Remote work needs manager approval."},
            {"file_name": "policy.pdf", "chunk_id": 9, "score": 0.9, "excerpt": "made up"},
            {"file_name": "policy.pdf", "chunk_id": 2, "score": 1.7, "excerpt": "bad score"}
         ],
         "confidence_explanation": "direct statement",
         "clarifying_question": null}"#;
        let s = parse_synthesis(raw, &supplied()).unwrap();
        assert!(s.answer.starts_with("Approval"));
        assert_eq!(s.sources.len(), 1);
        assert_eq!(s.sources[0].chunk_id, 2);
        assert_eq!(s.confidence_explanation.as_deref(), Some("direct statement"));
        assert_eq!(s.clarifying_question, None);
    }

    #[test]
    fn missing_or_empty_answer_is_rejected() {
        assert!(parse_synthesis(r#"{"sources": []}"#, &[]).is_err());
        assert!(parse_synthesis(r#"{"answer": "  "}"#, &[]).is_err());
        assert!(parse_synthesis(r#"{"answer": 3}"#, &[]).is_err());
        assert!(parse_synthesis("plain prose only", &[]).is_err());
    }

    #[test]
    fn long_excerpts_are_truncated() {
        let long = "w".repeat(500);
        let raw = format!(
            r#"{{"answer": "a", "sources": [{{"file_name": "policy.pdf", "chunk_id": 2, "score": 0.5, "excerpt": "{long}"}}]}}"#
        );
        let s = parse_synthesis(&raw, &supplied()).unwrap();
        assert_eq!(s.sources[0].excerpt.chars().count(), 200);
    }
}
