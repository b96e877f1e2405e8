//! Deterministic backend that replays scripted fragments.
//!
//! Contains no transport logic. Used by the test suites and by the
//! `--mock` flag for offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::{ChatBackend, FragmentStream, ReplyRequest};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    AtOpen(String),
    AfterFragments(usize, String),
}

#[derive(Debug)]
pub struct ScriptedBackend {
    fragments: Vec<String>,
    failure: Option<Failure>,
    hang: bool,
    delay: Option<Duration>,
    opens: AtomicUsize,
    requests: Mutex<Vec<ReplyRequest>>,
}

impl ScriptedBackend {
    /// Replays `fragments` for every request, then ends the stream.
    #[must_use]
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: None,
            hang: false,
            delay: None,
            opens: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Canned markdown reply streamed word by word, for offline demos.
    #[must_use]
    pub fn demo() -> Self {
        let reply = "This is an **offline** reply from the scripted backend.\n\n\
                     Nothing was sent to Gemini. Here is a snippet so code panels show up:\n\n\
                     ```rust\nfn main() {\n    println!(\"hello from nexus\");\n}\n```\n\n\
                     Run without `--mock` once `GEMINI_API_KEY` is set.";
        let fragments: Vec<String> = reply
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        Self::new(fragments).with_delay(Duration::from_millis(40))
    }

    /// Fail when the stream is opened, before any fragment.
    #[must_use]
    pub fn failing_at_open(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::AtOpen(message.into()));
        self
    }

    /// Emit the first `count` fragments, then fail.
    #[must_use]
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::AfterFragments(count, message.into()));
        self
    }

    /// Never end the stream after the scripted fragments.
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Sleep before each fragment.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of streams opened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ReplyRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_reply(&self, request: ReplyRequest) -> Result<FragmentStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let mut items: Vec<Result<String>> = Vec::new();
        match &self.failure {
            Some(Failure::AtOpen(message)) => return Err(Error::transport(message.clone())),
            Some(Failure::AfterFragments(count, message)) => {
                items.extend(self.fragments.iter().take(*count).cloned().map(Ok));
                items.push(Err(Error::transport(message.clone())));
            }
            None => items.extend(self.fragments.iter().cloned().map(Ok)),
        }

        let delay = self.delay;
        let scripted = stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });

        if self.hang {
            Ok(Box::pin(scripted.chain(stream::pending())))
        } else {
            Ok(Box::pin(scripted))
        }
    }
}
