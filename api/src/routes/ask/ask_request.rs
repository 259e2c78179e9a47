use contextor::AskOptions;
use serde::Deserialize;

/// Request payload for POST /ask.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// Natural language question.
    pub question: String,
    /// Restrict the question to one document.
    #[serde(default)]
    pub file_id: Option<String>,
    /// Restrict the question to one knowledge collection.
    #[serde(default)]
    pub collection: Option<String>,
    /// Ask for a longer, more thorough answer.
    #[serde(default)]
    pub detailed: bool,
}

impl AskRequest {
    pub fn options(&self) -> AskOptions {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        AskOptions {
            file_id: non_empty(&self.file_id),
            collection: non_empty(&self.collection),
            detailed: self.detailed,
        }
    }
}
