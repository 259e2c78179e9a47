//! Public API types re-used by external crates (e.g., the HTTP API layer).

use serde::{Deserialize, Serialize};

/// Router outcome. Serialized in SCREAMING_SNAKE_CASE (`MEDIUM_CONFIDENCE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouterStatus {
    Ok,
    MediumConfidence,
    LowConfidence,
    NoRelevantDocuments,
    NoContent,
    Error,
}

impl RouterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RouterStatus::Ok => "OK",
            RouterStatus::MediumConfidence => "MEDIUM_CONFIDENCE",
            RouterStatus::LowConfidence => "LOW_CONFIDENCE",
            RouterStatus::NoRelevantDocuments => "NO_RELEVANT_DOCUMENTS",
            RouterStatus::NoContent => "NO_CONTENT",
            RouterStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for RouterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document aggregate computed fresh for each question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileScore {
    pub file_id: String,
    pub file_name: String,
    pub index_name: String,
    /// Best similarity among the document's retrieved chunks.
    pub score: f32,
    /// Short excerpt of the best chunk.
    pub summary: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDetail {
    pub top_file: Option<String>,
    pub top_score: f32,
    pub file_scores: Vec<FileScore>,
}

/// A cited `(file, chunk)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_name: String,
    pub chunk_id: u64,
    pub score: f32,
    /// At most 200 characters.
    pub excerpt: String,
}

/// A context chunk that was fed to the model.
///
/// # Example
/// ```
/// use contextor::UsedChunk;
/// let c = UsedChunk {
///     file_id: "42".into(),
///     file_name: "handbook.pdf".into(),
///     chunk_id: 3,
///     score: 0.81,
///     text: "Vacation requests go through HR.".into(),
/// };
/// assert_eq!(c.label(), "handbook.pdf#3");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsedChunk {
    pub file_id: String,
    pub file_name: String,
    pub chunk_id: u64,
    pub score: f32,
    pub text: String,
}

impl UsedChunk {
    /// Citation label used in prompts and answers.
    pub fn label(&self) -> String {
        format!("{}#{}", self.file_name, self.chunk_id)
    }
}

/// Query-time output of the router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterResult {
    pub status: RouterStatus,
    pub selected_files: Vec<String>,
    pub routing_detail: RoutingDetail,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence_explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifying_question: Option<String>,
    pub raw_used_chunks: Vec<UsedChunk>,
}

impl RouterResult {
    /// Result with no routing, no sources and no chunks.
    pub fn bare(status: RouterStatus, answer: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            status,
            selected_files: Vec::new(),
            routing_detail: RoutingDetail::default(),
            answer: answer.into(),
            sources: Vec::new(),
            confidence_explanation: explanation.into(),
            clarifying_question: None,
            raw_used_chunks: Vec::new(),
        }
    }
}

/// Scope and depth of a single question.
///
/// `file_id` wins over `collection`; with neither, every document is a candidate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AskOptions {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Lifts the default word cap.
    #[serde(default)]
    pub detailed: bool,
}

/// What `answer` hands back to the chat-style request handler.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerResponse {
    pub success: bool,
    /// The answer text, or a user-facing failure message.
    pub response: String,
    pub status: RouterStatus,
    pub result: RouterResult,
}

impl From<RouterResult> for AnswerResponse {
    fn from(result: RouterResult) -> Self {
        let success = !matches!(
            result.status,
            RouterStatus::NoRelevantDocuments | RouterStatus::NoContent | RouterStatus::Error
        );
        Self {
            success,
            response: result.answer.clone(),
            status: result.status,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_screaming_snake_case() {
        let s = serde_json::to_string(&RouterStatus::NoRelevantDocuments).unwrap();
        assert_eq!(s, "\"NO_RELEVANT_DOCUMENTS\"");
        assert_eq!(RouterStatus::MediumConfidence.to_string(), "MEDIUM_CONFIDENCE");
    }

    #[test]
    fn absent_clarifying_question_is_omitted() {
        let r = RouterResult::bare(RouterStatus::Ok, "fine", "HIGH");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("clarifying_question").is_none());
    }

    #[test]
    fn short_circuit_statuses_are_failures() {
        let r = RouterResult::bare(RouterStatus::NoContent, "nothing", "");
        assert!(!AnswerResponse::from(r).success);
        let r = RouterResult::bare(RouterStatus::LowConfidence, "maybe", "");
        assert!(AnswerResponse::from(r).success);
    }
}
