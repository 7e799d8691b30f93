use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::user::User;

pub const ASSISTANT_ID: &str = "ai";
pub const ASSISTANT_NAME: &str = "EduAI";

/// One chat message. `text` is mutable only while a reply is streaming into
/// it; everything else is fixed at creation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub from_assistant: bool,
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn user(sender: &User, text: impl Into<String>, attachment: Option<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            text: text.into(),
            timestamp: Utc::now(),
            from_assistant: false,
            attachment,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: ASSISTANT_ID.to_string(),
            sender_name: ASSISTANT_NAME.to_string(),
            text: text.into(),
            timestamp: Utc::now(),
            from_assistant: true,
            attachment: None,
        }
    }
}

/// Ordered, append-only message log. The single mutate-in-place exception is
/// the streaming reply placeholder, tracked by `open_reply` so at most one
/// can be open at a time.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    open_reply: Option<Uuid>,
}

impl Conversation {
    pub fn seeded(seed: Vec<Message>) -> Self {
        Self {
            messages: seed,
            open_reply: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_open_reply(&self) -> bool {
        self.open_reply.is_some()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends an empty assistant placeholder and returns its id. The caller
    /// serializes sends, so a second open placeholder is a caller bug.
    pub fn begin_assistant_reply(&mut self) -> Uuid {
        debug_assert!(
            self.open_reply.is_none(),
            "a reply placeholder is already open"
        );
        let message = Message::assistant("");
        let id = message.id;
        self.messages.push(message);
        self.open_reply = Some(id);
        id
    }

    /// Concatenates a streamed fragment onto the message with `id`. Silently
    /// ignored when no such message exists (a stale stream writing after a
    /// reset lands here).
    pub fn append_fragment(&mut self, id: Uuid, fragment: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.text.push_str(fragment);
        }
    }

    /// Overwrites the text of the message with `id` instead of
    /// concatenating; for replacing a partial reply wholesale.
    pub fn replace_text(&mut self, id: Uuid, text: impl Into<String>) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.text = text.into();
        }
    }

    pub fn finalize_reply(&mut self, id: Uuid) {
        if self.open_reply == Some(id) {
            self.open_reply = None;
        }
    }

    /// Wholesale replacement of the log; used by clear-history.
    pub fn reset(&mut self, seed: Vec<Message>) {
        self.messages = seed;
        self.open_reply = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::directory;

    #[test]
    fn append_preserves_insertion_order() {
        let users = directory();
        let mut conversation = Conversation::default();
        conversation.append(Message::user(&users[0], "first", None));
        conversation.append(Message::user(&users[0], "second", None));
        let texts: Vec<_> = conversation.messages().iter().map(|m| &m.text).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let mut conversation = Conversation::default();
        let id = conversation.begin_assistant_reply();
        assert!(conversation.has_open_reply());
        for fragment in ["Hel", "lo, ", "world"] {
            conversation.append_fragment(id, fragment);
        }
        assert_eq!(conversation.messages()[0].text, "Hello, world");
        conversation.finalize_reply(id);
        assert!(!conversation.has_open_reply());
    }

    #[test]
    fn fragment_for_unknown_id_is_ignored() {
        let mut conversation = Conversation::default();
        conversation.append(Message::assistant("kept"));
        conversation.append_fragment(Uuid::new_v4(), "lost");
        assert_eq!(conversation.messages()[0].text, "kept");
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn replace_text_overwrites() {
        let mut conversation = Conversation::default();
        let id = conversation.begin_assistant_reply();
        conversation.append_fragment(id, "partial");
        conversation.replace_text(id, "Error: stream failed");
        assert_eq!(conversation.messages()[0].text, "Error: stream failed");
        conversation.replace_text(Uuid::new_v4(), "ignored");
        assert_eq!(conversation.messages()[0].text, "Error: stream failed");
    }

    #[test]
    fn reset_replaces_log_and_closes_placeholder() {
        let mut conversation = Conversation::default();
        let _ = conversation.begin_assistant_reply();
        conversation.reset(vec![Message::assistant("fresh greeting")]);
        assert_eq!(conversation.len(), 1);
        assert!(!conversation.has_open_reply());
        conversation.reset(Vec::new());
        assert!(conversation.is_empty());
    }

    #[test]
    fn placeholder_ids_are_unique() {
        let mut conversation = Conversation::default();
        let a = conversation.begin_assistant_reply();
        conversation.finalize_reply(a);
        let b = conversation.begin_assistant_reply();
        assert_ne!(a, b);
    }
}
