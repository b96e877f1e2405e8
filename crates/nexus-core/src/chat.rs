//! State of the active chat: the selected mode, its session, and its
//! transcript.
//!
//! Mode switches and submissions happen on the caller's thread. Replies are
//! produced by a spawned task and come back as [`ReplyEvent`]s, which the
//! caller feeds to [`ChatState::apply`]. Events from a session that has
//! since been replaced are dropped there, so a stale stream can never write
//! into the current transcript.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::{run_exchange, ReplyEvent, ReplyEventKind, FAILURE_MESSAGE};
use crate::error::Result;
use crate::mode::{config_for, AppMode, ModeConfig};
use crate::session::{ChatSession, SessionFactory};
use crate::transcript::Transcript;

pub struct ChatState {
    factory: SessionFactory,
    mode: AppMode,
    session: Option<ChatSession>,
    transcript: Transcript,
    busy: bool,
    in_flight: Option<JoinHandle<()>>,
    fragment_timeout: Option<Duration>,
}

impl ChatState {
    /// No session is requested until the first [`switch_to`](Self::switch_to).
    pub fn new(factory: SessionFactory, mode: AppMode) -> Self {
        Self {
            factory,
            mode,
            session: None,
            transcript: Transcript::new(),
            busy: false,
            in_flight: None,
            fragment_timeout: None,
        }
    }

    pub fn with_fragment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn mode_config(&self) -> &'static ModeConfig {
        config_for(self.mode)
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Start over in `mode` with a fresh session and an empty transcript.
    ///
    /// Any exchange still streaming is abandoned. If the session cannot be
    /// created the error is returned and no session is live until the next
    /// successful switch.
    pub fn switch_to(&mut self, mode: AppMode) -> Result<()> {
        let config = config_for(mode);

        self.abort_in_flight();
        self.mode = mode;
        self.session = None;
        self.transcript.clear();
        self.busy = false;

        let session = self.factory.create_session(config.system_instruction, &[])?;
        info!(mode = mode.display_name(), session = %session.id(), "switched mode");
        self.session = Some(session);
        Ok(())
    }

    /// Send `text` in the current session.
    ///
    /// Returns false, changing nothing, when the text is blank, no session is
    /// live, or an exchange is already in flight.
    pub fn submit(&mut self, text: &str, events: &UnboundedSender<ReplyEvent>) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(session) = self.session.clone() else {
            return false;
        };
        if self.busy {
            debug!("submission ignored while a reply is streaming");
            return false;
        }

        self.busy = true;
        self.transcript.push_user(text);
        self.transcript.open_reply();

        self.in_flight = Some(tokio::spawn(run_exchange(
            session,
            text.to_string(),
            events.clone(),
            self.fragment_timeout,
        )));
        true
    }

    /// Apply a reply event. Returns true when the transcript changed.
    pub fn apply(&mut self, event: ReplyEvent) -> bool {
        let current = self.session.as_ref().map(ChatSession::id);
        if current != Some(event.session) {
            warn!(session = %event.session, "dropping event from a replaced session");
            return false;
        }
        if !self.busy {
            debug!(session = %event.session, "dropping event after exchange ended");
            return false;
        }

        match event.kind {
            ReplyEventKind::Content(text) => self.transcript.set_open_reply(&text),
            ReplyEventKind::Finished => {
                self.transcript.close_reply();
                self.finish_exchange();
                true
            }
            ReplyEventKind::Failed(reason) => {
                error!(session = %event.session, %reason, "error sending message");
                self.transcript.close_reply();
                self.transcript.push_model(FAILURE_MESSAGE);
                self.finish_exchange();
                true
            }
        }
    }

    fn finish_exchange(&mut self) {
        self.busy = false;
        self.in_flight = None;
    }

    fn abort_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl Drop for ChatState {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}
