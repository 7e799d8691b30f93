//! Per-session lifecycle: submit, stream, finalize, clear.
//!
//! The controller is I/O-free. `submit` hands back an `OutboundRequest` that
//! the app layer runs through the stream adapter; fragments and the stream
//! end come back in through `apply_fragment` / `finish_stream`. That keeps
//! every transition testable without a network.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::conversation::{Conversation, Message, ASSISTANT_NAME};
use crate::user::User;

/// Prompt substituted when a message carries an attachment but no text.
const ATTACHMENT_ONLY_PROMPT: &str = "Tell me about this attachment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug, Clone)]
pub enum SessionKind {
    Assistant,
    Peer(User),
}

/// Live search state for one session. Derived against the current message
/// list on every use; cleared by clear-history.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub open: bool,
    pub query: String,
    pub active_match: usize,
}

/// Everything the app needs to drive one generation call for a submitted
/// message.
pub struct OutboundRequest {
    pub reply_id: Uuid,
    pub prompt: String,
    pub context: String,
    pub attachment: Option<Attachment>,
    pub cancel: CancellationToken,
}

pub struct ChatSession {
    pub kind: SessionKind,
    pub conversation: Conversation,
    pub phase: Phase,
    /// Typing indicator: set between submit and the first fragment.
    pub awaiting_first_fragment: bool,
    /// Single staged attachment for the next outgoing message.
    pub pending_attachment: Option<Attachment>,
    pub search: SearchState,
    reply_target: Option<Uuid>,
    cancel: Option<CancellationToken>,
}

impl ChatSession {
    pub fn assistant(user: &User) -> Self {
        Self {
            kind: SessionKind::Assistant,
            conversation: Conversation::seeded(vec![Self::greeting(user)]),
            phase: Phase::Idle,
            awaiting_first_fragment: false,
            pending_attachment: None,
            search: SearchState::default(),
            reply_target: None,
            cancel: None,
        }
    }

    pub fn peer(recipient: User) -> Self {
        Self {
            kind: SessionKind::Peer(recipient),
            conversation: Conversation::default(),
            phase: Phase::Idle,
            awaiting_first_fragment: false,
            pending_attachment: None,
            search: SearchState::default(),
            reply_target: None,
            cancel: None,
        }
    }

    fn greeting(user: &User) -> Message {
        Message::assistant(format!(
            "Hello {}! I am {}, your campus assistant. How can I help you today?",
            user.name, ASSISTANT_NAME
        ))
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self.kind, SessionKind::Assistant)
    }

    pub fn title(&self) -> String {
        match &self.kind {
            SessionKind::Assistant => ASSISTANT_NAME.to_string(),
            SessionKind::Peer(user) => user.name.clone(),
        }
    }

    /// Submits the composed message. No-op when the text is blank and no
    /// attachment is staged, and while an assistant reply is in flight
    /// (sends are serialized, which is what keeps a single placeholder
    /// open at a time).
    ///
    /// Returns the generation request for assistant sessions; peer messages
    /// stay local (there is no backend, recipients never receive anything).
    pub fn submit(&mut self, text: &str, user: &User) -> Option<OutboundRequest> {
        if text.trim().is_empty() && self.pending_attachment.is_none() {
            return None;
        }
        if self.is_assistant() && self.phase != Phase::Idle {
            return None;
        }

        let attachment = self.pending_attachment.take();
        self.conversation
            .append(Message::user(user, text, attachment.clone()));

        if !self.is_assistant() {
            return None;
        }

        let reply_id = self.conversation.begin_assistant_reply();
        self.reply_target = Some(reply_id);
        self.phase = Phase::Sending;
        self.awaiting_first_fragment = true;
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let prompt = if text.trim().is_empty() {
            ATTACHMENT_ONLY_PROMPT.to_string()
        } else {
            text.to_string()
        };
        Some(OutboundRequest {
            reply_id,
            prompt,
            context: format!("Context: campus chat session for {}.", user.name),
            attachment,
            cancel,
        })
    }

    /// Called once the adapter has been invoked for the open request.
    pub fn mark_streaming(&mut self) {
        if self.phase == Phase::Sending {
            self.phase = Phase::Streaming;
        }
    }

    pub fn owns_reply(&self, id: Uuid) -> bool {
        self.reply_target == Some(id)
    }

    pub fn apply_fragment(&mut self, id: Uuid, fragment: &str) {
        // First fragment ends the typing indicator.
        self.awaiting_first_fragment = false;
        self.conversation.append_fragment(id, fragment);
    }

    /// Stream exhaustion. Normal completion, the error fallback, and
    /// cancellation all look the same here: a finite sequence ended. The
    /// indicator is cleared unconditionally to cover zero-fragment streams.
    pub fn finish_stream(&mut self, id: Uuid) {
        self.conversation.finalize_reply(id);
        if self.reply_target == Some(id) {
            self.reply_target = None;
            self.cancel = None;
            self.phase = Phase::Idle;
        }
        self.awaiting_first_fragment = false;
    }

    /// Destructive reset. Assistant sessions reseed with a fresh greeting,
    /// peer sessions go empty. Refused while a reply is streaming so a live
    /// stream never writes into a discarded log.
    pub fn clear_history(&mut self, user: &User) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        let seed = if self.is_assistant() {
            vec![Self::greeting(user)]
        } else {
            Vec::new()
        };
        self.conversation.reset(seed);
        self.search = SearchState::default();
        true
    }

    /// Stops consuming fragments for the in-flight reply, if any. The
    /// adapter still delivers `End`, which finalizes the placeholder.
    pub fn cancel_stream(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::directory;

    fn faculty() -> User {
        directory()
            .into_iter()
            .find(|u| u.name.contains("Rajesh"))
            .unwrap()
    }

    fn attachment() -> Attachment {
        Attachment::from_bytes("notes.txt".to_string(), "text/plain".to_string(), b"hi")
    }

    #[test]
    fn blank_submit_with_no_attachment_is_a_no_op() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let before = session.conversation.len();
        assert!(session.submit("   ", &user).is_none());
        assert_eq!(session.conversation.len(), before);
        assert_eq!(session.phase, Phase::Idle);
    }

    #[test]
    fn submit_appends_user_message_then_placeholder() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let request = session.submit("hello there", &user).unwrap();

        let messages = session.conversation.messages();
        // greeting, user message, placeholder
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text, "hello there");
        assert!(!messages[1].from_assistant);
        assert!(messages[2].from_assistant);
        assert!(messages[2].text.is_empty());
        assert_eq!(messages[2].id, request.reply_id);
        assert_eq!(session.phase, Phase::Sending);
        assert!(session.awaiting_first_fragment);
        assert!(request.context.contains(&user.name));
    }

    #[test]
    fn streamed_fragments_build_the_final_text() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let request = session.submit("greet me", &user).unwrap();
        session.mark_streaming();
        assert_eq!(session.phase, Phase::Streaming);

        for fragment in ["Hel", "lo, ", "world"] {
            session.apply_fragment(request.reply_id, fragment);
        }
        assert!(!session.awaiting_first_fragment);
        session.finish_stream(request.reply_id);

        let last = session.conversation.messages().last().unwrap();
        assert_eq!(last.text, "Hello, world");
        assert_eq!(session.phase, Phase::Idle);
    }

    #[test]
    fn zero_fragment_stream_still_clears_the_indicator() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let request = session.submit("anything", &user).unwrap();
        session.mark_streaming();
        session.finish_stream(request.reply_id);
        assert!(!session.awaiting_first_fragment);
        assert_eq!(session.phase, Phase::Idle);
        assert!(!session.conversation.has_open_reply());
    }

    #[test]
    fn submits_are_serialized_while_a_reply_is_open() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let _request = session.submit("first", &user).unwrap();
        assert!(session.submit("second", &user).is_none());
        assert!(session.conversation.has_open_reply());
    }

    #[test]
    fn pending_attachment_moves_onto_the_message() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        session.pending_attachment = Some(attachment());
        let request = session.submit("", &user).unwrap();

        assert!(session.pending_attachment.is_none());
        assert_eq!(request.prompt, ATTACHMENT_ONLY_PROMPT);
        assert_eq!(
            request.attachment.as_ref().map(|a| a.name.as_str()),
            Some("notes.txt")
        );
        let user_msg = &session.conversation.messages()[1];
        assert!(user_msg.attachment.is_some());
    }

    #[test]
    fn peer_submit_stays_local() {
        let user = faculty();
        let recipient = directory()
            .into_iter()
            .find(|u| u.name.contains("Sneha"))
            .unwrap();
        let mut session = ChatSession::peer(recipient);
        assert!(session.submit("hi sneha", &user).is_none());
        assert_eq!(session.conversation.len(), 1);
        assert_eq!(session.phase, Phase::Idle);
    }

    #[test]
    fn assistant_clear_reseeds_a_fresh_greeting() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        for i in 0..4 {
            session
                .conversation
                .append(Message::user(&user, format!("m{i}"), None));
        }
        assert_eq!(session.conversation.len(), 5);
        session.search.query = "m1".to_string();

        assert!(session.clear_history(&user));
        assert_eq!(session.conversation.len(), 1);
        let greeting = &session.conversation.messages()[0];
        assert!(greeting.from_assistant);
        assert!(greeting.text.contains(&user.name));
        assert!(session.search.query.is_empty());
    }

    #[test]
    fn peer_clear_empties_the_log() {
        let user = faculty();
        let recipient = directory().into_iter().last().unwrap();
        let mut session = ChatSession::peer(recipient);
        session.submit("one", &user);
        session.submit("two", &user);
        assert!(session.clear_history(&user));
        assert!(session.conversation.is_empty());
    }

    #[test]
    fn clear_is_refused_while_streaming() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let request = session.submit("question", &user).unwrap();
        session.mark_streaming();

        assert!(!session.clear_history(&user));
        assert_eq!(session.conversation.len(), 3);

        session.finish_stream(request.reply_id);
        assert!(session.clear_history(&user));
    }

    #[test]
    fn fragments_route_by_id_even_after_more_messages() {
        let user = faculty();
        let mut session = ChatSession::assistant(&user);
        let request = session.submit("q", &user).unwrap();
        session.mark_streaming();
        assert!(session.owns_reply(request.reply_id));
        assert!(!session.owns_reply(Uuid::new_v4()));

        session.apply_fragment(request.reply_id, "answer");
        let placeholder = session
            .conversation
            .messages()
            .iter()
            .find(|m| m.id == request.reply_id)
            .unwrap();
        assert_eq!(placeholder.text, "answer");
    }
}
