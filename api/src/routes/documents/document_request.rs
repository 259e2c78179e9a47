use chrono::{DateTime, Utc};
use rag_store::{IndexingStatus, SourceDocument};
use serde::{Deserialize, Serialize};

/// Request payload for POST /documents.
///
/// Text extraction happens upstream; `extracted_text` is `None` when it failed.
#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

impl UploadDocumentRequest {
    /// File type from the request, else from the name's extension.
    pub fn resolved_type(&self) -> String {
        self.file_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .or_else(|| {
                self.file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_lowercase())
            })
            .unwrap_or_else(|| "unknown".into())
    }
}

/// Registry view of a document, without its text.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub has_text: bool,
    pub indexing_status: IndexingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub index_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentView {
    pub fn new(doc: SourceDocument, index_name: String) -> Self {
        Self {
            has_text: doc
                .extracted_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
            file_id: doc.file_id,
            file_name: doc.file_name,
            file_type: doc.file_type,
            indexing_status: doc.indexing_status,
            last_error: doc.last_error,
            index_name,
            uploaded_at: doc.uploaded_at,
            updated_at: doc.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_falls_back_to_extension() {
        let req: UploadDocumentRequest =
            serde_json::from_str(r#"{"file_id": "1", "file_name": "Plan.DOCX"}"#).unwrap();
        assert_eq!(req.resolved_type(), "docx");

        let req: UploadDocumentRequest =
            serde_json::from_str(r#"{"file_id": "1", "file_name": "notes", "file_type": " PDF "}"#)
                .unwrap();
        assert_eq!(req.resolved_type(), "pdf");
    }
}
