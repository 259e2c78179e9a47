//! Shared LLM access for the document QA backend.
//!
//! Two logical profiles live behind [`service_profiles::LlmServiceProfiles`]:
//! a **chat** profile used for answer synthesis and an **embedding** profile
//! used for chunk and query vectors. Each profile can point at a local Ollama
//! runtime or an OpenAI-compatible API.

pub mod chat;
pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;

pub use chat::{ChatMessage, ChatReply, ChatRole};
pub use config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
pub use error_handler::{AiLlmError, ConfigError};
pub use service_profiles::LlmServiceProfiles;
