pub mod gemini;
pub mod mock;
mod sse;

pub use gemini::{GeminiClient, GeminiSettings};
pub use mock::ScriptedBackend;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use crate::state::ChatMessage;

/// Lazily produced reply text, one fragment per item. Finite and not
/// restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Everything a backend needs to produce the next model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
    pub text: String,
}

/// A remote conversational endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streamed reply to `request.text`.
    async fn stream_reply(&self, request: ReplyRequest) -> Result<FragmentStream>;
}
