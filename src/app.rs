use std::path::Path;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::config::Settings;
use crate::conversation::Message;
use crate::gemini::{GeminiClient, StreamEvent, INVALID_KEY_FALLBACK};
use crate::search;
use crate::session::{ChatSession, OutboundRequest};
use crate::speech::{SpeechError, SpeechToText, UnsupportedSpeech};
use crate::tui::AppEvent;
use crate::user::{self, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub current_user: User,
    pub settings: Settings,
    pub input_mode: InputMode,

    // Sessions (assistant first, then peers)
    pub sessions: Vec<ChatSession>,
    pub active_session: usize,

    // Composer state
    pub input: String,
    pub cursor: usize, // char position in `input`

    // Overlays
    pub show_clear_confirm: bool,
    pub attach_input: Option<String>, // Some = path prompt open
    pub attach_cursor: usize,
    pub notice: Option<String>,
    pub listening: bool,

    // Message pane scroll state (updated during render)
    pub msg_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub stick_to_bottom: bool,

    // Animation state (0-2 for the ellipsis)
    pub animation_frame: u8,

    gemini: Option<GeminiClient>,
    speech: Box<dyn SpeechToText>,
    events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        current_user: User,
        settings: Settings,
        gemini: Option<GeminiClient>,
        events_tx: UnboundedSender<AppEvent>,
    ) -> Self {
        let mut sessions = vec![ChatSession::assistant(&current_user)];
        for peer in user::directory() {
            if peer.id != current_user.id {
                sessions.push(ChatSession::peer(peer));
            }
        }

        Self {
            should_quit: false,
            current_user,
            settings,
            input_mode: InputMode::Normal,
            sessions,
            active_session: 0,
            input: String::new(),
            cursor: 0,
            show_clear_confirm: false,
            attach_input: None,
            attach_cursor: 0,
            notice: None,
            listening: false,
            msg_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            stick_to_bottom: true,
            animation_frame: 0,
            gemini,
            speech: Box::new(UnsupportedSpeech),
            events_tx,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.sessions[self.active_session]
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.sessions[self.active_session]
    }

    pub fn next_session(&mut self) {
        self.active_session = (self.active_session + 1) % self.sessions.len();
        self.stick_to_bottom = true;
        self.scroll_to_bottom();
    }

    pub fn prev_session(&mut self) {
        self.active_session =
            (self.active_session + self.sessions.len() - 1) % self.sessions.len();
        self.stick_to_bottom = true;
        self.scroll_to_bottom();
    }

    /// Submits the composer contents to the active session and, for the
    /// assistant, starts the streaming reply.
    pub fn submit_input(&mut self) {
        if self.input.trim().is_empty() && self.session().pending_attachment.is_none() {
            return;
        }
        let text = self.input.clone();
        let user = self.current_user.clone();
        let request = self.session_mut().submit(&text, &user);

        self.input.clear();
        self.cursor = 0;
        self.stick_to_bottom = true;
        self.scroll_to_bottom();

        if let Some(request) = request {
            self.dispatch(request);
            self.session_mut().mark_streaming();
        }
    }

    /// Runs one generation request through the adapter, forwarding stream
    /// events into the main loop. With no API key configured the reply
    /// resolves immediately to the credential fallback, in-band like any
    /// other provider failure.
    fn dispatch(&mut self, request: OutboundRequest) {
        let tx = self.events_tx.clone();
        let reply_id = request.reply_id;

        let Some(client) = &self.gemini else {
            let _ = tx.send(AppEvent::Stream(
                reply_id,
                StreamEvent::Fragment(INVALID_KEY_FALLBACK.to_string()),
            ));
            let _ = tx.send(AppEvent::Stream(reply_id, StreamEvent::End));
            return;
        };

        let mut rx = client.stream_generate(
            &request.prompt,
            &request.context,
            request.attachment,
            request.cancel,
        );
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tx.send(AppEvent::Stream(reply_id, event)).is_err() {
                    break;
                }
            }
        });
    }

    /// Routes a stream event to the session that owns the reply id. Streams
    /// keep flowing while another session is in the foreground; the id keeps
    /// every write on its own placeholder.
    pub fn handle_stream(&mut self, id: Uuid, event: StreamEvent) {
        let Some(idx) = self.sessions.iter().position(|s| s.owns_reply(id)) else {
            return;
        };
        match event {
            StreamEvent::Fragment(fragment) => {
                self.sessions[idx].apply_fragment(id, &fragment);
                if idx == self.active_session && self.stick_to_bottom {
                    self.scroll_to_bottom();
                }
            }
            StreamEvent::End => {
                self.sessions[idx].finish_stream(id);
                if idx == self.active_session && self.stick_to_bottom {
                    self.scroll_to_bottom();
                }
            }
        }
    }

    /// Encodes the file at `path` into the pending slot. Read failures are
    /// surfaced as a blocking notice; nothing is staged.
    pub fn attach_file(&mut self, path: &str) {
        match Attachment::from_file(Path::new(path.trim())) {
            Ok(attachment) => {
                info!(name = %attachment.name, size = %attachment.size_label, "staged attachment");
                self.session_mut().pending_attachment = Some(attachment);
            }
            Err(err) => {
                error!(%err, "attachment failed");
                self.notice = Some(err.to_string());
            }
        }
    }

    pub fn drop_pending_attachment(&mut self) {
        self.session_mut().pending_attachment = None;
    }

    // Search

    pub fn open_search(&mut self) {
        let session = self.session_mut();
        session.search.open = true;
        session.search.query.clear();
        session.search.active_match = 0;
    }

    pub fn close_search(&mut self) {
        let session = self.session_mut();
        session.search.open = false;
        session.search.query.clear();
        session.search.active_match = 0;
        self.stick_to_bottom = true;
        self.scroll_to_bottom();
    }

    pub fn search_matches(&self) -> Vec<usize> {
        let session = self.session();
        search::filter_matches(session.conversation.messages(), &session.search.query)
    }

    pub fn next_search_match(&mut self) {
        let matches = self.search_matches();
        let session = self.session_mut();
        session.search.active_match =
            search::next_match(matches.len(), session.search.active_match);
        self.scroll_to_search_match(&matches);
    }

    pub fn prev_search_match(&mut self) {
        let matches = self.search_matches();
        let session = self.session_mut();
        session.search.active_match =
            search::prev_match(matches.len(), session.search.active_match);
        self.scroll_to_search_match(&matches);
    }

    fn scroll_to_search_match(&mut self, matches: &[usize]) {
        let active = self.session().search.active_match;
        let Some(&message_idx) = matches.get(active) else {
            return;
        };
        self.stick_to_bottom = false;
        self.msg_scroll = self.message_start_line(message_idx);
    }

    // Clear history

    pub fn confirm_clear(&mut self) {
        self.show_clear_confirm = false;
        let user = self.current_user.clone();
        if self.session_mut().clear_history(&user) {
            info!("conversation cleared");
            self.stick_to_bottom = true;
            self.msg_scroll = 0;
        } else {
            self.notice = Some("Cannot clear while a reply is streaming.".to_string());
        }
    }

    // Voice input

    pub fn toggle_voice_input(&mut self) {
        if self.listening {
            self.listening = false;
            return;
        }
        self.listening = true;
        match self.speech.transcribe_once() {
            Ok(transcript) => {
                crate::speech::append_transcript(&mut self.input, &transcript);
                self.cursor = self.input.chars().count();
                self.listening = false;
            }
            Err(SpeechError::Unsupported) => {
                self.notice =
                    Some("Speech input is not supported in this environment.".to_string());
                self.listening = false;
            }
            Err(err) => {
                error!(%err, "speech recognition failed");
                self.listening = false;
            }
        }
    }

    // Settings (saved on every change)

    pub fn cycle_theme(&mut self) {
        self.settings.theme = self.settings.theme.next();
        if let Err(err) = self.settings.save() {
            error!(%err, "failed to save settings");
        }
    }

    pub fn toggle_animations(&mut self) {
        self.settings.disable_animations = !self.settings.disable_animations;
        if let Err(err) = self.settings.save() {
            error!(%err, "failed to save settings");
        }
    }

    // Scrolling

    pub fn scroll_up(&mut self) {
        self.msg_scroll = self.msg_scroll.saturating_sub(1);
        self.stick_to_bottom = false;
    }

    pub fn scroll_down(&mut self) {
        let max = self.total_lines().saturating_sub(self.chat_height);
        self.msg_scroll = self.msg_scroll.saturating_add(1).min(max);
        self.stick_to_bottom = self.msg_scroll >= max;
    }

    pub fn scroll_to_top(&mut self) {
        self.msg_scroll = 0;
        self.stick_to_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.msg_scroll = self.total_lines().saturating_sub(self.chat_height);
        self.stick_to_bottom = true;
    }

    /// Approximate rendered height of the active conversation, using the
    /// same wrap width the renderer uses. Character count, not byte length,
    /// so multi-byte text wraps consistently.
    fn total_lines(&self) -> u16 {
        let wrap = self.wrap_width();
        let session = self.session();
        let mut total: u16 = 0;
        for message in session.conversation.messages() {
            total += Self::message_height(message, wrap);
        }
        if session.awaiting_first_fragment {
            total += 2; // sender line + indicator
        }
        total
    }

    fn message_start_line(&self, target: usize) -> u16 {
        let wrap = self.wrap_width();
        let mut line: u16 = 0;
        for (i, message) in self.session().conversation.messages().iter().enumerate() {
            if i == target {
                break;
            }
            line += Self::message_height(message, wrap);
        }
        line
    }

    fn wrap_width(&self) -> usize {
        if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            60
        }
    }

    pub fn message_height(message: &Message, wrap: usize) -> u16 {
        let mut lines: u16 = 1; // sender line
        if message.attachment.is_some() {
            lines += 1;
        }
        for line in message.text.lines() {
            let chars = line.chars().count();
            if chars == 0 {
                lines += 1;
            } else {
                lines += ((chars - 1) / wrap.max(1) + 1) as u16;
            }
        }
        lines + 1 // blank line after message
    }

    /// Tick animation frame (driven by the Tick event)
    pub fn tick_animation(&mut self) {
        if self.settings.disable_animations {
            return;
        }
        if self.session().awaiting_first_fragment {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Cancels every in-flight stream; called on teardown.
    pub fn shutdown(&mut self) {
        for session in &self.sessions {
            session.cancel_stream();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(user::sign_in(), Settings::default(), None, tx);
        (app, rx)
    }

    #[tokio::test]
    async fn missing_api_key_resolves_to_credential_fallback() {
        let (mut app, mut rx) = test_app();
        app.input = "hello".to_string();
        app.submit_input();

        let reply_id = {
            let messages = app.session().conversation.messages();
            messages.last().unwrap().id
        };

        // First the fallback fragment, then the end marker.
        match rx.recv().await {
            Some(AppEvent::Stream(id, StreamEvent::Fragment(text))) => {
                assert_eq!(id, reply_id);
                assert_eq!(text, INVALID_KEY_FALLBACK);
                app.handle_stream(id, StreamEvent::Fragment(text));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await {
            Some(AppEvent::Stream(id, StreamEvent::End)) => {
                app.handle_stream(id, StreamEvent::End);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let last = app.session().conversation.messages().last().unwrap();
        assert_eq!(last.text, INVALID_KEY_FALLBACK);
        assert_eq!(app.session().phase, crate::session::Phase::Idle);
    }

    #[tokio::test]
    async fn stream_events_route_to_the_owning_session() {
        let (mut app, _rx) = test_app();
        app.input = "question".to_string();
        app.submit_input();
        let reply_id = app.session().conversation.messages().last().unwrap().id;

        // Foreground a different session; fragments still land correctly.
        app.next_session();
        app.handle_stream(reply_id, StreamEvent::Fragment("answer".to_string()));
        app.handle_stream(reply_id, StreamEvent::End);

        let assistant = &app.sessions[0];
        let placeholder = assistant
            .conversation
            .messages()
            .iter()
            .find(|m| m.id == reply_id)
            .unwrap();
        assert_eq!(placeholder.text, "answer");
    }

    #[tokio::test]
    async fn unknown_stream_ids_are_ignored() {
        let (mut app, _rx) = test_app();
        app.handle_stream(Uuid::new_v4(), StreamEvent::Fragment("stale".to_string()));
        assert_eq!(app.session().conversation.len(), 1); // just the greeting
    }

    #[tokio::test]
    async fn voice_input_surfaces_unsupported_notice() {
        let (mut app, _rx) = test_app();
        app.toggle_voice_input();
        assert!(!app.listening);
        assert!(app.notice.as_deref().unwrap_or("").contains("not supported"));
    }

    #[tokio::test]
    async fn attach_failure_sets_blocking_notice() {
        let (mut app, _rx) = test_app();
        app.attach_file("/no/such/file.pdf");
        assert!(app.notice.is_some());
        assert!(app.session().pending_attachment.is_none());
    }

    #[tokio::test]
    async fn session_cycling_wraps() {
        let (mut app, _rx) = test_app();
        let count = app.sessions.len();
        for _ in 0..count {
            app.next_session();
        }
        assert_eq!(app.active_session, 0);
        app.prev_session();
        assert_eq!(app.active_session, count - 1);
    }
}
