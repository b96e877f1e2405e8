use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use nexus_core::AppMode;
use ratatui::layout::Rect;

use crate::app::{App, Focus};
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply(reply) => app.apply_reply(reply),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any focus
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    match key.code {
        KeyCode::PageUp => app.page_up(),
        KeyCode::PageDown => app.page_down(),
        _ => match app.focus {
            Focus::Sidebar => handle_sidebar(app, key),
            Focus::Input => handle_input(app, key),
        },
    }
}

fn handle_sidebar(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.sidebar_down(),
        KeyCode::Char('k') | KeyCode::Up => app.sidebar_up(),
        KeyCode::Enter => app.sidebar_enter(),
        KeyCode::Char(c @ '1'..='4') => {
            let idx = c as usize - '1' as usize;
            if let Some(mode) = AppMode::all().get(idx).copied() {
                app.select_mode(mode);
            }
        }
        KeyCode::Tab | KeyCode::Char('i') => app.focus = Focus::Input,
        _ => {}
    }
}

fn handle_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => app.focus = Focus::Sidebar,
        // Input is disabled until the reply finishes
        _ if app.is_busy() => {}
        KeyCode::Enter => app.submit(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{ChatState, ReplyEvent, ScriptedBackend, SessionFactory};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app_with(backend: ScriptedBackend) -> (App, mpsc::UnboundedReceiver<ReplyEvent>) {
        let factory = SessionFactory::with_backend(Arc::new(backend));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(ChatState::new(factory, AppMode::General), tx, "test-model");
        app.start();
        (app, rx)
    }

    fn app() -> App {
        app_with(ScriptedBackend::new(["ok"])).0
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)));
        }
    }

    #[tokio::test]
    async fn q_types_into_input_but_quits_from_sidebar() {
        let mut app = app();
        handle_event(&mut app, key(KeyCode::Char('q')));
        assert_eq!(app.input, "q");
        assert!(!app.should_quit);

        handle_event(&mut app, key(KeyCode::Esc));
        assert_eq!(app.focus, Focus::Sidebar);
        handle_event(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn digits_pick_modes_from_sidebar() {
        let mut app = app();
        handle_event(&mut app, key(KeyCode::Tab));
        handle_event(&mut app, key(KeyCode::Char('3')));
        assert_eq!(app.mode(), AppMode::Coder);
        handle_event(&mut app, key(KeyCode::Char('9')));
        assert_eq!(app.mode(), AppMode::Coder);
    }

    #[tokio::test]
    async fn ctrl_c_quits_while_typing() {
        let mut app = app();
        handle_event(
            &mut app,
            AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        );
        assert!(app.should_quit);
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn typing_is_ignored_while_reply_streams() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["partial"]).hanging());
        type_text(&mut app, "hi");
        handle_event(&mut app, key(KeyCode::Enter));
        assert!(app.is_busy());
        assert!(app.input.is_empty());

        type_text(&mut app, "more");
        for code in [KeyCode::Backspace, KeyCode::Delete, KeyCode::Left, KeyCode::End] {
            handle_event(&mut app, key(code));
        }
        handle_event(&mut app, key(KeyCode::Enter));
        app.insert_char('z');

        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert_eq!(app.chat.transcript().len(), 2);

        handle_event(&mut app, key(KeyCode::Esc));
        assert_eq!(app.focus, Focus::Sidebar);
    }

    #[tokio::test]
    async fn typing_resumes_after_reply_finishes() {
        let (mut app, mut rx) = app_with(ScriptedBackend::new(["done"]));
        type_text(&mut app, "hi");
        handle_event(&mut app, key(KeyCode::Enter));

        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            handle_event(&mut app, AppEvent::Reply(event));
            if terminal {
                break;
            }
        }

        assert!(!app.is_busy());
        type_text(&mut app, "ok");
        assert_eq!(app.input, "ok");
    }

    #[test]
    fn point_in_rect_excludes_far_edges() {
        let rect = Rect::new(2, 3, 4, 5);
        assert!(point_in_rect(2, 3, rect));
        assert!(point_in_rect(5, 7, rect));
        assert!(!point_in_rect(6, 3, rect));
        assert!(!point_in_rect(2, 8, rect));
    }
}
