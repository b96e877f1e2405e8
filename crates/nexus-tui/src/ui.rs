use nexus_core::{split_code_blocks, AppMode, ChatRole, Segment};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, Focus};

const SIDEBAR_WIDTH: u16 = 26;

/// Parse a line of text, styling **bold** runs and `inline code`
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        let (marker, style) = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                ("**", Style::default().add_modifier(Modifier::BOLD))
            }
            '`' => ("`", Style::default().fg(Color::Green)),
            _ => {
                current_text.push(c);
                continue;
            }
        };

        // Find the closing marker
        let mut inner = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if marker == "**" && c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            if marker == "`" && c == '`' {
                found_close = true;
                break;
            }
            inner.push(c);
        }

        if found_close && !inner.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(inner, style));
        } else {
            // No closing marker, treat as literal
            current_text.push_str(marker);
            current_text.push_str(&inner);
            if found_close {
                current_text.push_str(marker);
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: body, footer
    let [body_area, footer_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, main_area] = Layout::horizontal([
        Constraint::Length(SIDEBAR_WIDTH),
        Constraint::Min(0),
    ])
    .areas(body_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(main_area);

    render_sidebar(app, frame, sidebar_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Sidebar;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(" Nexus AI ", Style::default().fg(Color::Cyan).bold()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [list_area, credit_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(inner);

    let active = app.mode();
    let items: Vec<ListItem> = AppMode::all()
        .into_iter()
        .enumerate()
        .map(|(i, mode)| {
            let style = if mode == active {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("{} {}", mode.config().icon.glyph(), mode.display_name()),
                    style,
                ),
            ]))
        })
        .collect();

    let highlight = if focused {
        Style::default().bg(Color::DarkGray)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .highlight_style(highlight)
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.sidebar_state);

    let credit = Paragraph::new("Powered by Gemini")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(credit, credit_area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} · {} ", app.mode().display_name(), app.model));

    if app.chat.transcript().is_empty() {
        app.set_content_height(0);
        let chat = Paragraph::new(empty_state(app))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(chat, area);
        return;
    }

    // Measured before the block is attached so borders are not counted
    let chat = Paragraph::new(Text::from(transcript_lines(app))).wrap(Wrap { trim: false });
    let total = u16::try_from(chat.line_count(app.chat_width)).unwrap_or(u16::MAX);
    app.set_content_height(total);

    let chat = chat.block(block).scroll((app.scroll, 0));
    frame.render_widget(chat, area);
}

fn empty_state(app: &App) -> Vec<Line<'static>> {
    const HEIGHT: u16 = 4;
    let top_padding = app.chat_height.saturating_sub(HEIGHT) / 2;

    let mut lines: Vec<Line<'static>> = (0..top_padding).map(|_| Line::default()).collect();
    lines.push(Line::from(Span::styled(
        app.mode_config().icon.glyph(),
        Style::default().fg(Color::Cyan).bold(),
    )));
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        format!("Nexus {}", app.mode().display_name()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        "Start a conversation to get started.",
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let transcript = app.chat.transcript();
    let last = transcript.len().saturating_sub(1);
    let mut lines: Vec<Line<'static>> = Vec::new();

    for (i, msg) in transcript.messages().iter().enumerate() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Model => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                let streaming = app.is_busy() && transcript.has_open_reply() && i == last;
                if streaming && msg.content.is_empty() {
                    // Animated ellipsis: cycles through ".", "..", "..."
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                } else {
                    push_model_content(&mut lines, &msg.content);
                }
            }
        }
        lines.push(Line::default());
    }

    lines
}

fn push_model_content(lines: &mut Vec<Line<'static>>, content: &str) {
    let border = Style::default().fg(Color::DarkGray);

    for segment in split_code_blocks(content) {
        match segment {
            Segment::Text(text) => {
                lines.extend(text.lines().map(parse_markdown_line));
            }
            Segment::Code { language, code } => {
                lines.push(Line::from(vec![
                    Span::styled("┌─ ", border),
                    Span::styled(Segment::label(&language).to_string(), border.bold()),
                ]));
                for line in code.lines() {
                    lines.push(Line::from(vec![
                        Span::styled("│ ", border),
                        Span::styled(line.to_string(), Style::default().fg(Color::Green)),
                    ]));
                }
                lines.push(Line::from(Span::styled("└─", border)));
            }
        }
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Input;
    let busy = app.is_busy();
    let border_color = if focused && !busy { Color::Yellow } else { Color::DarkGray };
    let title = if busy {
        " Message (waiting for reply) "
    } else if focused {
        " Message (Enter to send) "
    } else {
        " Message (Tab to focus) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        Paragraph::new(Span::styled(
            app.placeholder(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        let visible_text: String = app
            .input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        let color = if busy { Color::DarkGray } else { Color::Cyan };
        Paragraph::new(visible_text).style(Style::default().fg(color))
    };

    frame.render_widget(input.block(input_block), area);

    if focused && !busy {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(err) = &app.status_error {
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(" ERROR ", Style::default().bg(Color::Red).fg(Color::White).bold()),
            Span::styled(format!(" {err}"), Style::default().fg(Color::Red)),
        ]))
        .style(Style::default().bg(Color::Black));
        frame.render_widget(footer, area);
        return;
    }

    let (focus_text, focus_style) = match app.focus {
        Focus::Sidebar => (" MODES ", Style::default().bg(Color::Blue).fg(Color::White)),
        Focus::Input => (" INPUT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.focus {
        Focus::Sidebar => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" select ", label_style),
            Span::styled(" 1-4 ", key_style),
            Span::styled(" mode ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        Focus::Input => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" modes ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Tab ", key_style),
        Span::styled(" focus ", label_style),
    ]);
    if app.is_busy() {
        hints.push(Span::styled(" streaming… ", Style::default().fg(Color::DarkGray)));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(focus_text, focus_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BUSY_PLACEHOLDER;
    use nexus_core::{ChatState, ReplyEvent, ScriptedBackend, SessionFactory};
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn bold_and_inline_code_are_styled() {
        let line = parse_markdown_line("use **this** and `that`");
        assert_eq!(plain(&line), "use this and that");
        assert_eq!(line.spans.len(), 4);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[3].style.fg, Some(Color::Green));
    }

    #[test]
    fn unclosed_markers_stay_literal() {
        assert_eq!(plain(&parse_markdown_line("2 ** 3")), "2 ** 3");
        assert_eq!(plain(&parse_markdown_line("a `b")), "a `b");
    }

    #[test]
    fn code_blocks_render_as_labeled_panel() {
        let mut lines = Vec::new();
        push_model_content(&mut lines, "Try:\n```\nls\n```");
        let text: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(text, vec!["Try:", "┌─ code", "│ ls", "└─"]);
    }

    fn app_with(backend: ScriptedBackend) -> (App, mpsc::UnboundedReceiver<ReplyEvent>) {
        let factory = SessionFactory::with_backend(Arc::new(backend));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(ChatState::new(factory, AppMode::General), tx, "test-model");
        app.start();
        (app, rx)
    }

    async fn finish_reply(app: &mut App, rx: &mut mpsc::UnboundedReceiver<ReplyEvent>) {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            app.apply_reply(event);
            if terminal {
                break;
            }
        }
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn word_wrapped_reply_scrolls_to_its_last_line() {
        // 40 columns leave a 12-column transcript pane beside the sidebar
        let reply = format!("{}END_MARKER", "abcdefghi ".repeat(30));
        let (mut app, mut rx) = app_with(ScriptedBackend::new([reply]));
        app.input = "go".to_string();
        app.submit();
        finish_reply(&mut app, &mut rx).await;

        let mut terminal = Terminal::new(TestBackend::new(40, 14)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert!(app.follow);
        assert_eq!(app.scroll, app.max_scroll);
        assert!(screen(&terminal).contains("END_MARKER"));
    }

    #[tokio::test]
    async fn input_is_dimmed_while_reply_streams() {
        let (mut app, _rx) = app_with(ScriptedBackend::new(["partial"]).hanging());
        app.input = "go".to_string();
        app.submit();

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let screen = screen(&terminal);
        assert!(screen.contains("waiting for reply"));
        assert!(screen.contains(BUSY_PLACEHOLDER));
    }
}
