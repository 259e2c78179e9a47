//! Cross-document retrieval router.
//!
//! Public API: [`Router::answer`]. It resolves the candidate documents for a
//! question (one file, one knowledge collection, or everything), searches
//! their per-document indexes, aggregates a best score per file, applies the
//! confidence tiers and tie-break rule, builds a grounded prompt and parses
//! the model's JSON reply, falling back to the raw text when it is malformed.

pub mod api_types;
pub mod cfg;
pub mod error;
pub mod llm;
pub mod parse;
pub mod prompt;
pub mod router;
pub mod score;

pub use api_types::{
    AnswerResponse, AskOptions, FileScore, RouterResult, RouterStatus, RoutingDetail, SourceRef,
    UsedChunk,
};
pub use cfg::RouterConfig;
pub use error::ContextorError;
pub use llm::{ChatFuture, ChatModel};
pub use router::{RoutePlan, Router, compose, route};
pub use score::ConfidenceTier;
