use nexus_core::{AppMode, ChatState, ModeConfig, ReplyEvent};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

/// Placeholder shown in the input while a reply streams in.
pub const BUSY_PLACEHOLDER: &str = "Generating response...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Input,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: Focus,
    pub chat: ChatState,
    pub replies: UnboundedSender<ReplyEvent>,
    pub model: String,

    // Sidebar cursor, independent of the active mode until Enter
    pub sidebar_state: ListState,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Transcript scrolling
    pub scroll: u16,
    pub max_scroll: u16,
    pub follow: bool, // stick to the newest entry
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>, // for mouse hit-testing, updated during render

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Configuration problems shown in the footer
    pub status_error: Option<String>,
}

impl App {
    pub fn new(
        chat: ChatState,
        replies: UnboundedSender<ReplyEvent>,
        model: impl Into<String>,
    ) -> Self {
        let mut sidebar_state = ListState::default();
        sidebar_state.select(mode_index(chat.mode()));

        Self {
            should_quit: false,
            focus: Focus::Input,
            chat,
            replies,
            model: model.into(),
            sidebar_state,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            max_scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            status_error: None,
        }
    }

    pub fn mode(&self) -> AppMode {
        self.chat.mode()
    }

    pub fn mode_config(&self) -> &'static ModeConfig {
        self.chat.mode_config()
    }

    pub fn is_busy(&self) -> bool {
        self.chat.is_busy()
    }

    pub fn placeholder(&self) -> &'static str {
        if self.is_busy() {
            BUSY_PLACEHOLDER
        } else {
            self.mode_config().placeholder
        }
    }

    /// Open a session for the startup mode.
    pub fn start(&mut self) {
        let mode = self.chat.mode();
        self.switch_mode(mode);
    }

    /// Select `mode` from the sidebar. Re-selecting the live mode keeps the
    /// conversation.
    pub fn select_mode(&mut self, mode: AppMode) {
        if mode == self.chat.mode() && self.chat.session().is_some() {
            self.sidebar_state.select(mode_index(mode));
            return;
        }
        self.switch_mode(mode);
    }

    fn switch_mode(&mut self, mode: AppMode) {
        self.sidebar_state.select(mode_index(mode));
        self.scroll = 0;
        self.max_scroll = 0;
        self.follow = true;
        self.animation_frame = 0;

        match self.chat.switch_to(mode) {
            Ok(()) => self.status_error = None,
            Err(err) => {
                tracing::error!(%err, mode = mode.display_name(), "could not start session");
                self.status_error = Some(err.to_string());
            }
        }
    }

    pub fn sidebar_down(&mut self) {
        let last = AppMode::all().len() - 1;
        let next = self.sidebar_state.selected().map_or(0, |i| (i + 1).min(last));
        self.sidebar_state.select(Some(next));
    }

    pub fn sidebar_up(&mut self) {
        let prev = self.sidebar_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.sidebar_state.select(Some(prev));
    }

    pub fn sidebar_enter(&mut self) {
        let selected = self
            .sidebar_state
            .selected()
            .and_then(|i| AppMode::all().get(i).copied());
        if let Some(mode) = selected {
            self.select_mode(mode);
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar => Focus::Input,
            Focus::Input => Focus::Sidebar,
        };
    }

    /// Send the input box contents. The input is cleared only when the
    /// message was accepted.
    pub fn submit(&mut self) {
        if self.chat.submit(&self.input, &self.replies) {
            self.input.clear();
            self.cursor = 0;
            self.follow = true;
        }
    }

    pub fn apply_reply(&mut self, event: ReplyEvent) {
        if self.chat.apply(event) && !self.is_busy() {
            self.animation_frame = 0;
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        if self.scroll < self.max_scroll {
            self.follow = false;
        }
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll);
        if self.scroll >= self.max_scroll {
            self.follow = true;
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.chat_height.max(1) / 2);
    }

    pub fn page_down(&mut self) {
        self.scroll_down(self.chat_height.max(1) / 2);
    }

    /// Record the transcript's rendered height, and stay pinned to the
    /// bottom when following.
    pub fn set_content_height(&mut self, total_lines: u16) {
        self.max_scroll = total_lines.saturating_sub(self.chat_height);
        if self.follow || self.scroll > self.max_scroll {
            self.scroll = self.max_scroll;
        }
    }

    // Input editing, cursor counted in chars for UTF-8 safety.
    // The input is read-only while a reply streams.

    pub fn insert_char(&mut self, c: char) {
        if self.is_busy() {
            return;
        }
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if !self.is_busy() && self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if !self.is_busy() && self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }
}

fn mode_index(mode: AppMode) -> Option<usize> {
    AppMode::all().iter().position(|m| *m == mode)
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{ChatMessage, Error, ScriptedBackend, SessionFactory};
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn app_with(backend: ScriptedBackend) -> (App, UnboundedReceiver<ReplyEvent>) {
        let factory = SessionFactory::with_backend(Arc::new(backend));
        let chat = ChatState::new(factory, AppMode::General);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(chat, tx, "test-model");
        app.start();
        (app, rx)
    }

    async fn drain(app: &mut App, rx: &mut UnboundedReceiver<ReplyEvent>) {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            app.apply_reply(event);
            if terminal {
                break;
            }
        }
    }

    #[tokio::test]
    async fn editing_handles_multibyte_chars() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["ok"]));
        for c in "héllo".chars() {
            app.insert_char(c);
        }
        app.cursor_left();
        app.cursor_left();
        app.backspace();
        assert_eq!(app.input, "hélo");
        assert_eq!(app.cursor, 2);

        app.cursor_home();
        app.delete();
        assert_eq!(app.input, "élo");

        app.cursor_end();
        app.cursor_right();
        assert_eq!(app.cursor, 3);
    }

    #[tokio::test]
    async fn submit_clears_input_and_streams_reply() {
        let (mut app, mut rx) = app_with(ScriptedBackend::new(["Hi", " there"]));
        app.input = "hello".to_string();
        app.cursor = 5;

        app.submit();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert!(app.is_busy());
        assert_eq!(app.placeholder(), BUSY_PLACEHOLDER);

        drain(&mut app, &mut rx).await;
        assert_eq!(
            app.chat.transcript().messages(),
            &[ChatMessage::user("hello"), ChatMessage::model("Hi there")]
        );
        assert_eq!(app.placeholder(), app.mode_config().placeholder);
    }

    #[tokio::test]
    async fn input_is_locked_while_busy() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["x"]).hanging());
        app.input = "first".to_string();
        app.submit();

        app.insert_char('z');
        app.backspace();
        app.delete();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);

        app.input = "second".to_string();
        app.submit();
        assert_eq!(app.input, "second");
        assert_eq!(app.chat.transcript().len(), 2);
    }

    #[tokio::test]
    async fn reselecting_active_mode_keeps_conversation() {
        let (mut app, mut rx) = app_with(ScriptedBackend::new(["answer"]));
        app.input = "question".to_string();
        app.submit();
        drain(&mut app, &mut rx).await;

        app.select_mode(AppMode::General);
        assert_eq!(app.chat.transcript().len(), 2);

        app.select_mode(AppMode::Writer);
        assert!(app.chat.transcript().is_empty());
        assert_eq!(app.mode(), AppMode::Writer);
        assert_eq!(app.sidebar_state.selected(), Some(3));
    }

    #[tokio::test]
    async fn sidebar_cursor_clamps_and_enter_switches() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["x"]));
        for _ in 0..10 {
            app.sidebar_down();
        }
        assert_eq!(app.sidebar_state.selected(), Some(3));
        app.sidebar_up();
        app.sidebar_enter();
        assert_eq!(app.mode(), AppMode::Coder);

        app.toggle_focus();
        assert_eq!(app.focus, Focus::Sidebar);
        app.toggle_focus();
        assert_eq!(app.focus, Focus::Input);
    }

    #[tokio::test]
    async fn scrolling_up_stops_following_until_bottom() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["x"]));
        app.chat_height = 10;
        app.set_content_height(30);
        assert_eq!(app.scroll, 20);
        assert!(app.follow);

        app.scroll_up(5);
        assert!(!app.follow);
        app.set_content_height(40);
        assert_eq!(app.scroll, 15);

        app.scroll_down(100);
        assert_eq!(app.scroll, 30);
        assert!(app.follow);
        app.set_content_height(50);
        assert_eq!(app.scroll, 40);
    }

    #[tokio::test]
    async fn configuration_error_is_shown_and_blocks_input() {
        let factory = SessionFactory::new(|| Err(Error::configuration("API key not set")));
        let chat = ChatState::new(factory, AppMode::Planner);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(chat, tx, "test-model");
        app.start();

        let status = app.status_error.clone().unwrap_or_default();
        assert!(status.contains("API key not set"));

        app.input = "hello".to_string();
        app.submit();
        assert_eq!(app.input, "hello");
        assert!(app.chat.transcript().is_empty());
    }
}
