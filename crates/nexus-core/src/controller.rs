//! One request/response exchange, run as a background task.
//!
//! The task never touches the transcript. It reports progress through
//! [`ReplyEvent`]s tagged with the session they belong to, and the owner of
//! the transcript applies them in arrival order.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};
use crate::session::{ChatSession, SessionId};

/// Shown in place of a reply when an exchange fails.
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEventKind {
    /// Everything received so far, not just the latest fragment.
    Content(String),
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub session: SessionId,
    pub kind: ReplyEventKind,
}

impl ReplyEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, ReplyEventKind::Content(_))
    }
}

/// Sends exactly one terminal event, on drop if nothing else did.
struct TerminalGuard {
    session: SessionId,
    events: UnboundedSender<ReplyEvent>,
    sent: bool,
}

impl TerminalGuard {
    fn finish(mut self, kind: ReplyEventKind) {
        self.sent = true;
        let _ = self.events.send(ReplyEvent {
            session: self.session,
            kind,
        });
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if !self.sent {
            let _ = self.events.send(ReplyEvent {
                session: self.session,
                kind: ReplyEventKind::Failed("exchange ended before completing".to_string()),
            });
        }
    }
}

/// Stream the reply to `text` from `session`, reporting through `events`.
///
/// `fragment_timeout` bounds the wait for the stream to open and for each
/// following fragment. `None` waits indefinitely.
pub async fn run_exchange(
    session: ChatSession,
    text: String,
    events: UnboundedSender<ReplyEvent>,
    fragment_timeout: Option<Duration>,
) {
    let guard = TerminalGuard {
        session: session.id(),
        events: events.clone(),
        sent: false,
    };

    match stream_reply(&session, &text, &events, fragment_timeout).await {
        Ok(()) => guard.finish(ReplyEventKind::Finished),
        Err(err) => guard.finish(ReplyEventKind::Failed(err.to_string())),
    }
}

async fn stream_reply(
    session: &ChatSession,
    text: &str,
    events: &UnboundedSender<ReplyEvent>,
    fragment_timeout: Option<Duration>,
) -> Result<()> {
    let mut stream = within(fragment_timeout, session.send_streaming(text)).await??;
    let mut accumulated = String::new();

    while let Some(fragment) = within(fragment_timeout, stream.next()).await? {
        accumulated.push_str(&fragment?);
        let event = ReplyEvent {
            session: session.id(),
            kind: ReplyEventKind::Content(accumulated.clone()),
        };
        if events.send(event).is_err() {
            // Nobody is listening any more
            break;
        }
    }

    Ok(())
}

async fn within<F: std::future::Future>(limit: Option<Duration>, future: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| Error::transport(format!("no reply within {}s", limit.as_secs_f64()))),
        None => Ok(future.await),
    }
}
