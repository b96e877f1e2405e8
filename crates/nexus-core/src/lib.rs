pub mod ai;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod mode;
pub mod segments;
pub mod session;
pub mod state;
pub mod transcript;

// Re-export main types for convenience
pub use ai::{ChatBackend, FragmentStream, GeminiClient, ReplyRequest, ScriptedBackend};
pub use chat::ChatState;
pub use config::Config;
pub use controller::{ReplyEvent, ReplyEventKind, FAILURE_MESSAGE};
pub use error::{Error, Result};
pub use mode::{config_for, AppMode, ModeConfig, ModeIcon};
pub use segments::{split_code_blocks, Segment};
pub use session::{ChatSession, SessionFactory, SessionId};
pub use state::{ChatMessage, ChatRole};
pub use transcript::Transcript;
