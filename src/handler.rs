use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(id, stream_event) => app.handle_stream(id, stream_event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global quit
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Blocking notice: any key acknowledges it.
    if app.notice.is_some() {
        app.notice = None;
        return;
    }

    if app.show_clear_confirm {
        handle_clear_confirm(app, key);
        return;
    }

    if app.attach_input.is_some() {
        handle_attach_prompt(app, key);
        return;
    }

    if app.session().search.open {
        handle_search_bar(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Compose
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.cursor = app.input.chars().count();
        }

        // Session switching
        KeyCode::Tab => app.next_session(),
        KeyCode::BackTab => app.prev_session(),

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Search
        KeyCode::Char('/') => app.open_search(),

        // Attachment staging
        KeyCode::Char('a') => {
            app.attach_input = Some(String::new());
            app.attach_cursor = 0;
        }
        KeyCode::Char('x') => app.drop_pending_attachment(),

        // Voice input
        KeyCode::Char('v') => app.toggle_voice_input(),

        // Clear history (with confirmation)
        KeyCode::Char('D') => app.show_clear_confirm = true,

        // Copy the newest message
        KeyCode::Char('c') => {
            if let Some(message) = app.session().conversation.messages().last() {
                copy_to_clipboard(&message.text);
            }
        }

        // Settings
        KeyCode::Char('t') => app.cycle_theme(),
        KeyCode::Char('m') => app.toggle_animations(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_search_bar(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_search(),
        KeyCode::Enter | KeyCode::Down => app.next_search_match(),
        KeyCode::Up => app.prev_search_match(),
        KeyCode::Backspace => {
            let session = app.session_mut();
            session.search.query.pop();
            session.search.active_match = 0;
        }
        KeyCode::Char(c) => {
            let session = app.session_mut();
            session.search.query.push(c);
            session.search.active_match = 0;
        }
        _ => {}
    }
}

fn handle_attach_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.attach_input = None;
        }
        KeyCode::Enter => {
            if let Some(path) = app.attach_input.take() {
                if !path.trim().is_empty() {
                    app.attach_file(&path);
                }
            }
        }
        KeyCode::Backspace => {
            if app.attach_cursor > 0 {
                app.attach_cursor -= 1;
                if let Some(input) = app.attach_input.as_mut() {
                    let byte_pos = char_to_byte_index(input, app.attach_cursor);
                    input.remove(byte_pos);
                }
            }
        }
        KeyCode::Left => {
            app.attach_cursor = app.attach_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app
                .attach_input
                .as_deref()
                .map(|s| s.chars().count())
                .unwrap_or(0);
            app.attach_cursor = (app.attach_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            if let Some(input) = app.attach_input.as_mut() {
                let byte_pos = char_to_byte_index(input, app.attach_cursor);
                input.insert(byte_pos, c);
                app.attach_cursor += 1;
            }
        }
        _ => {}
    }
}

fn handle_clear_confirm(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.confirm_clear(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            app.show_clear_confirm = false;
        }
        _ => {}
    }
}

fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    for cmd in ["pbcopy", "wl-copy", "xclip"] {
        if let Ok(mut child) = Command::new(cmd).stdin(Stdio::piped()).spawn() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::user;
    use crossterm::event::{KeyEvent, KeyModifiers};
    use tokio::sync::mpsc;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(user::sign_in(), Settings::default(), None, tx)
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[tokio::test]
    async fn editing_keeps_cursor_on_char_boundaries() {
        let mut app = test_app();
        press(&mut app, KeyCode::Char('i'));
        for c in "नमस्ते hi".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.input, "नमस्ते i");
    }

    #[tokio::test]
    async fn notice_blocks_input_until_acknowledged() {
        let mut app = test_app();
        app.notice = Some("something failed".to_string());
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        assert!(app.notice.is_none());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn search_typing_resets_active_match() {
        let mut app = test_app();
        press(&mut app, KeyCode::Char('/'));
        assert!(app.session().search.open);
        for c in "hello".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.session().search.query, "hello");
        assert_eq!(app.session().search.active_match, 0);
        press(&mut app, KeyCode::Esc);
        assert!(!app.session().search.open);
        assert!(app.session().search.query.is_empty());
    }

    #[tokio::test]
    async fn clear_confirm_requires_acknowledgement() {
        let mut app = test_app();
        press(&mut app, KeyCode::Char('D'));
        assert!(app.show_clear_confirm);
        press(&mut app, KeyCode::Char('n'));
        assert!(!app.show_clear_confirm);

        press(&mut app, KeyCode::Char('D'));
        press(&mut app, KeyCode::Char('y'));
        assert!(!app.show_clear_confirm);
        // Assistant session reseeds to a single greeting.
        assert_eq!(app.session().conversation.len(), 1);
    }
}
