//! Chat sessions and the factory that binds them to a backend.
//!
//! The backend client is connected lazily on the first session request and
//! cached for the lifetime of the factory. A failed connection is not
//! cached, so a later request retries it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream::{self, StreamExt};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::ai::{ChatBackend, FragmentStream, ReplyRequest};
use crate::error::{Error, Result};
use crate::state::ChatMessage;

/// Identity of a session, unique within one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

type History = Arc<Mutex<Vec<ChatMessage>>>;

/// Handle to one remote conversation.
///
/// Cloning shares the same conversation. The history grows by one user and
/// one model turn each time a reply stream runs to completion.
#[derive(Clone)]
pub struct ChatSession {
    id: SessionId,
    system_instruction: Arc<str>,
    history: History,
    backend: Arc<dyn ChatBackend>,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("system_instruction", &self.system_instruction)
            .field("turns", &self.history().len())
            .finish()
    }
}

impl ChatSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Snapshot of the turns committed so far.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send `text` and stream the reply.
    pub async fn send_streaming(&self, text: &str) -> Result<FragmentStream> {
        let request = ReplyRequest {
            system_instruction: self.system_instruction.to_string(),
            history: self.history(),
            text: text.to_string(),
        };
        debug!(session = %self.id, turns = request.history.len(), "sending message");

        let inner = self.backend.stream_reply(request).await?;
        Ok(commit_on_completion(inner, self.history.clone(), text.to_string()))
    }
}

struct CommitState {
    inner: FragmentStream,
    history: History,
    user_text: Option<String>,
    reply: String,
}

/// Pass fragments through and record the exchange once the stream ends
/// cleanly. An error anywhere in the stream leaves the history untouched.
fn commit_on_completion(
    inner: FragmentStream,
    history: History,
    user_text: String,
) -> FragmentStream {
    let state = CommitState {
        inner,
        history,
        user_text: Some(user_text),
        reply: String::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        match state.inner.next().await {
            Some(Ok(fragment)) => {
                state.reply.push_str(&fragment);
                Some((Ok(fragment), state))
            }
            Some(Err(err)) => {
                state.user_text = None;
                Some((Err(err), state))
            }
            None => {
                if let Some(text) = state.user_text.take() {
                    let reply = std::mem::take(&mut state.reply);
                    let mut history = state.history.lock().unwrap_or_else(PoisonError::into_inner);
                    history.push(ChatMessage::user(text));
                    history.push(ChatMessage::model(reply));
                }
                None
            }
        }
    }))
}

type Connector = Box<dyn Fn() -> Result<Arc<dyn ChatBackend>> + Send + Sync>;

/// Creates sessions bound to a lazily connected backend.
pub struct SessionFactory {
    connector: Connector,
    client: OnceCell<Arc<dyn ChatBackend>>,
    next_id: AtomicU64,
}

impl SessionFactory {
    /// `connector` is called on the first `create_session` and again only
    /// until it succeeds once.
    pub fn new<F>(connector: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ChatBackend>> + Send + Sync + 'static,
    {
        Self {
            connector: Box::new(connector),
            client: OnceCell::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Factory over an already constructed backend.
    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self::new(move || Ok(backend.clone()))
    }

    pub fn is_connected(&self) -> bool {
        self.client.get().is_some()
    }

    pub fn create_session(
        &self,
        system_instruction: &str,
        prior_turns: &[ChatMessage],
    ) -> Result<ChatSession> {
        if system_instruction.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "system instruction must not be empty".to_string(),
            ));
        }

        let backend = self.client.get_or_try_init(|| (self.connector)())?.clone();
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(session = %id, prior_turns = prior_turns.len(), "created chat session");

        Ok(ChatSession {
            id,
            system_instruction: Arc::from(system_instruction),
            history: Arc::new(Mutex::new(prior_turns.to_vec())),
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ScriptedBackend;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn connector_runs_once_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = SessionFactory::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ScriptedBackend::new(Vec::<String>::new())) as Arc<dyn ChatBackend>)
        });

        assert!(!factory.is_connected());
        let first = factory.create_session("sys", &[]).unwrap();
        let second = factory.create_session("sys", &[]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(factory.is_connected());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn failed_connection_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = SessionFactory::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(Error::configuration("API key missing"))
            } else {
                Ok(Arc::new(ScriptedBackend::new(Vec::<String>::new())) as Arc<dyn ChatBackend>)
            }
        });

        let err = factory.create_session("sys", &[]).unwrap_err();
        assert!(err.is_configuration());
        assert!(!factory.is_connected());

        assert!(factory.create_session("sys", &[]).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blank_instruction_is_rejected_without_connecting() {
        let factory = SessionFactory::new(|| Err(Error::configuration("unreachable")));
        let err = factory.create_session("  ", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(!factory.is_connected());
    }

    #[test]
    fn prior_turns_seed_history() {
        let factory = SessionFactory::with_backend(Arc::new(ScriptedBackend::new(["x"])));
        let turns = vec![ChatMessage::user("q"), ChatMessage::model("a")];
        let session = factory.create_session("sys", &turns).unwrap();

        assert_eq!(session.history(), turns);
        assert_eq!(session.system_instruction(), "sys");
    }

    #[tokio::test]
    async fn completed_stream_commits_exchange_to_history() {
        let backend = Arc::new(ScriptedBackend::new(["Hel", "lo"]));
        let factory = SessionFactory::with_backend(backend.clone());
        let session = factory.create_session("sys", &[]).unwrap();

        let stream = session.send_streaming("hi").await.unwrap();
        let _: Vec<_> = stream.collect().await;
        assert_eq!(
            session.history(),
            vec![ChatMessage::user("hi"), ChatMessage::model("Hello")]
        );

        let stream = session.send_streaming("again").await.unwrap();
        let _: Vec<_> = stream.collect().await;
        let requests = backend.requests();
        assert_eq!(requests[1].history.len(), 2);
        assert_eq!(requests[1].text, "again");
    }

    #[tokio::test]
    async fn failed_stream_leaves_history_untouched() {
        let backend = Arc::new(ScriptedBackend::new(["part"]).failing_after(1, "reset"));
        let factory = SessionFactory::with_backend(backend);
        let session = factory.create_session("sys", &[]).unwrap();

        let stream = session.send_streaming("hi").await.unwrap();
        let _: Vec<_> = stream.collect().await;
        assert!(session.history().is_empty());
    }
}
