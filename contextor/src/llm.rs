//! Chat model seam used by the router.

use std::{future::Future, pin::Pin};

use ai_llm_service::{ChatMessage, ChatReply, LlmServiceProfiles};

pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = ChatReply> + Send + 'a>>;

/// `chat(messages, max_tokens) -> {success, response}`.
///
/// Failures are reported through `ChatReply::success`, never as an error value.
pub trait ChatModel: Send + Sync {
    fn chat<'a>(&'a self, messages: &'a [ChatMessage], max_tokens: Option<u32>) -> ChatFuture<'a>;
}

impl ChatModel for LlmServiceProfiles {
    fn chat<'a>(&'a self, messages: &'a [ChatMessage], max_tokens: Option<u32>) -> ChatFuture<'a> {
        Box::pin(LlmServiceProfiles::chat(self, messages, max_tokens))
    }
}
