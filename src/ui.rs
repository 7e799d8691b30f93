use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::config::Theme;
use crate::conversation::Message;
use crate::search;
use crate::session::SessionKind;

/// Accent color per theme; the terminal equivalent of the web client's
/// gradient palettes.
fn accent(theme: Theme) -> Color {
    match theme {
        Theme::Default => Color::Blue,
        Theme::Cyber => Color::Magenta,
        Theme::Emerald => Color::Green,
        Theme::Ocean => Color::Cyan,
        Theme::Forest => Color::LightGreen,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let search_open = app.session().search.open;
    let pending = app.session().pending_attachment.is_some();

    let mut constraints = vec![Constraint::Length(1)];
    if search_open {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Min(0));
    if pending {
        constraints.push(Constraint::Length(1));
    }
    constraints.push(Constraint::Length(3));
    constraints.push(Constraint::Length(1));
    let areas = Layout::vertical(constraints).split(area);

    let mut idx = 0;
    render_header(app, frame, areas[idx]);
    idx += 1;
    if search_open {
        render_search_bar(app, frame, areas[idx]);
        idx += 1;
    }
    render_messages(app, frame, areas[idx]);
    idx += 1;
    if pending {
        render_pending_attachment(app, frame, areas[idx]);
        idx += 1;
    }
    render_input(app, frame, areas[idx]);
    idx += 1;
    render_footer(app, frame, areas[idx]);

    // Overlays (in order of priority)
    if let Some(notice) = app.notice.clone() {
        render_notice(frame, area, &notice);
    } else if app.show_clear_confirm {
        render_clear_confirm(app, frame, area);
    } else if app.attach_input.is_some() {
        render_attach_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let accent = accent(app.settings.theme);
    let mut spans: Vec<Span> = Vec::new();
    for (i, session) in app.sessions.iter().enumerate() {
        let title = format!(" {} ", session.title());
        if i == app.active_session {
            spans.push(Span::styled(
                title,
                Style::default().fg(Color::Black).bg(accent).bold(),
            ));
        } else {
            spans.push(Span::styled(title, Style::default().fg(Color::DarkGray)));
        }
        spans.push(Span::raw(" "));
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!(
            "{} ({})",
            app.current_user.name,
            app.current_user.role.display_name()
        ),
        Style::default().fg(Color::Gray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_search_bar(app: &mut App, frame: &mut Frame, area: Rect) {
    let matches = app.search_matches();
    let session = app.session();
    let counter = if session.search.query.trim().is_empty() {
        String::new()
    } else if matches.is_empty() {
        "no matches".to_string()
    } else {
        format!("{}/{}", session.search.active_match + 1, matches.len())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Search (Enter: next, Up: prev, Esc: close) ");
    let line = Line::from(vec![
        Span::raw(session.search.query.clone()),
        Span::styled("█", Style::default().fg(accent(app.settings.theme))),
        Span::raw("  "),
        Span::styled(counter, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(area);
    app.chat_height = inner.height;
    app.chat_width = inner.width;
    if app.stick_to_bottom {
        app.scroll_to_bottom();
    }

    let accent = accent(app.settings.theme);
    let session = app.session();
    let messages = session.conversation.messages();
    let matches = search::filter_matches(messages, &session.search.query);
    let active_message = matches.get(session.search.active_match).copied();

    if messages.is_empty() && !session.awaiting_first_fragment {
        let empty = Paragraph::new("No messages yet. Press i to start typing.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        let is_active_match = session.search.open && active_message == Some(i);
        push_message_lines(
            &mut lines,
            message,
            &session.search.query,
            is_active_match,
            &app.current_user.id,
            accent,
        );
    }

    if session.awaiting_first_fragment {
        lines.push(Line::from(Span::styled(
            crate::conversation::ASSISTANT_NAME,
            Style::default().fg(accent).bold(),
        )));
        let dots = if app.settings.disable_animations {
            "...".to_string()
        } else {
            ".".repeat(app.animation_frame as usize + 1)
        };
        lines.push(Line::from(Span::styled(
            format!("typing{dots}"),
            Style::default().fg(Color::DarkGray).italic(),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((app.msg_scroll, 0))
        .block(block);
    frame.render_widget(paragraph, area);
}

fn push_message_lines(
    lines: &mut Vec<Line<'static>>,
    message: &Message,
    query: &str,
    is_active_match: bool,
    current_user_id: &str,
    accent: Color,
) {
    let time = message
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let sender_style = if message.from_assistant {
        Style::default().fg(accent).bold()
    } else if message.sender_id == current_user_id {
        Style::default().fg(Color::White).bold()
    } else {
        Style::default().fg(Color::Gray).bold()
    };
    lines.push(Line::from(vec![
        Span::styled(message.sender_name.clone(), sender_style),
        Span::styled(format!("  {time}"), Style::default().fg(Color::DarkGray)),
    ]));

    if let Some(attachment) = &message.attachment {
        lines.push(Line::from(Span::styled(
            format!("[attachment] {} ({})", attachment.name, attachment.size_label),
            Style::default().fg(Color::DarkGray).italic(),
        )));
    }

    for text_line in message.text.lines() {
        let mut spans: Vec<Span<'static>> = Vec::new();
        for (segment, is_match) in search::highlight(text_line, query) {
            if is_match {
                let style = if is_active_match {
                    Style::default().fg(Color::Black).bg(Color::Yellow)
                } else {
                    Style::default()
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD)
                };
                spans.push(Span::styled(segment, style));
            } else {
                spans.push(Span::raw(segment));
            }
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::default());
}

fn render_pending_attachment(app: &App, frame: &mut Frame, area: Rect) {
    let Some(attachment) = app.session().pending_attachment.as_ref() else {
        return;
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" staged: {} ({})", attachment.name, attachment.size_label),
            Style::default().fg(accent(app.settings.theme)),
        ),
        Span::styled("  x: remove", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let title = if app.listening {
        " Listening... "
    } else if editing {
        " Message (Enter: send, Esc: done) "
    } else {
        " Message (i: edit) "
    };
    let border_style = if editing {
        Style::default().fg(accent(app.settings.theme))
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(app.input.as_str()).block(block), area);

    if editing {
        let x = inner.x + (app.cursor as u16).min(inner.width.saturating_sub(1));
        frame.set_cursor_position((x, inner.y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Editing => "Enter send | Esc done".to_string(),
        InputMode::Normal => {
            "i edit | / search | a attach | v voice | D clear | Tab session | t theme | q quit"
                .to_string()
        }
    };
    let line = Line::from(vec![
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
        Span::raw("  "),
        Span::styled(
            format!("[{}]", app.settings.theme.display_name()),
            Style::default().fg(accent(app.settings.theme)),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_notice(frame: &mut Frame, area: Rect, notice: &str) {
    let popup = centered_rect(60, 20, area);
    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Notice ");
    let text = format!("{notice}\n\nPress any key to continue.");
    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .block(block),
        popup,
    );
}

fn render_clear_confirm(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(50, 20, area);
    frame.render_widget(Clear, popup);
    let target = match &app.session().kind {
        SessionKind::Assistant => "This resets the assistant conversation.".to_string(),
        SessionKind::Peer(user) => format!("This deletes the chat with {}.", user.name),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Clear history? ");
    let text = format!("{target}\n\ny: confirm   n: cancel");
    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .block(block),
        popup,
    );
}

fn render_attach_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(70, 15, area);
    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent(app.settings.theme)))
        .title(" Attach file (path, Enter: stage, Esc: cancel) ");
    let path = app.attach_input.as_deref().unwrap_or("");
    let line = Line::from(vec![
        Span::raw(path.to_string()),
        Span::styled("█", Style::default().fg(accent(app.settings.theme))),
    ]);
    frame.render_widget(Paragraph::new(line).block(block), popup);
}

/// Centered sub-rectangle, sized as a percentage of `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);
    let horizontal = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1]);
    horizontal[1]
}
