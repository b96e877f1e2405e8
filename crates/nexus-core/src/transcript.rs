use crate::state::{ChatMessage, ChatRole};

/// Ordered conversation shown for the active mode.
///
/// Append-only, except for the single open model message at the end, whose
/// content is overwritten while a reply streams in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Whether a streamed reply is still being written into the last entry.
    pub fn has_open_reply(&self) -> bool {
        self.open.is_some()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.close_reply();
        self.messages.push(ChatMessage::user(content));
    }

    /// Append a finished model message, e.g. an error notice.
    pub fn push_model(&mut self, content: impl Into<String>) {
        self.close_reply();
        self.messages.push(ChatMessage::model(content));
    }

    /// Append an empty model message that later fragments are written into.
    pub fn open_reply(&mut self) {
        self.close_reply();
        self.messages.push(ChatMessage::model(String::new()));
        self.open = Some(self.messages.len() - 1);
    }

    /// Replace the open reply's content. Returns false when no reply is open.
    pub fn set_open_reply(&mut self, content: &str) -> bool {
        let Some(idx) = self.open else {
            return false;
        };
        match self.messages.get_mut(idx) {
            Some(message) if message.role == ChatRole::Model => {
                message.content.clear();
                message.content.push_str(content);
                true
            }
            _ => false,
        }
    }

    /// Stop accepting updates for the open reply, keeping its content.
    pub fn close_reply(&mut self) {
        self.open = None;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.open = None;
    }
}
