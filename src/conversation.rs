use crate::chat::{ChatMessage, Role};

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub message: ChatMessage,
    /// Set on assistant entries that hold an error instead of an answer.
    pub is_error: bool,
}

/// Message history of one chat session.
///
/// A turn appends the user's message and an empty assistant placeholder which
/// then grows fragment by fragment. Changing subject clears the history.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    subject: Option<String>,
    entries: Vec<ConversationEntry>,
    turn_open: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn is_turn_open(&self) -> bool {
        self.turn_open
    }

    /// Returns true when the history was reset.
    pub fn switch_subject(&mut self, key: &str) -> bool {
        if self.subject.as_deref() == Some(key) {
            return false;
        }
        self.subject = Some(key.to_string());
        self.entries.clear();
        self.turn_open = false;
        true
    }

    /// Messages to send as prior history: error replies and an open
    /// placeholder are left out.
    pub fn history_for_request(&self) -> Vec<ChatMessage> {
        let settled = if self.turn_open {
            &self.entries[..self.entries.len().saturating_sub(1)]
        } else {
            &self.entries[..]
        };
        settled
            .iter()
            .filter(|e| !e.is_error)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn begin_turn(&mut self, user_message: &str) {
        self.entries.push(ConversationEntry {
            message: ChatMessage::user(user_message),
            is_error: false,
        });
        self.entries.push(ConversationEntry {
            message: ChatMessage::assistant(String::new()),
            is_error: false,
        });
        self.turn_open = true;
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        if let Some(reply) = self.open_reply() {
            reply.message.content.push_str(fragment);
        }
    }

    /// Closes the turn and returns the full reply.
    pub fn finish_turn(&mut self) -> String {
        let reply = self
            .open_reply()
            .map(|e| e.message.content.clone())
            .unwrap_or_default();
        self.turn_open = false;
        reply
    }

    /// Replaces the open reply with the error text and closes the turn.
    pub fn fail_turn(&mut self, error: &dyn std::fmt::Display) {
        if let Some(reply) = self.open_reply() {
            reply.message.content = format!("Error: {error}");
            reply.is_error = true;
        }
        self.turn_open = false;
    }

    fn open_reply(&mut self) -> Option<&mut ConversationEntry> {
        if !self.turn_open {
            return None;
        }
        self.entries
            .last_mut()
            .filter(|e| e.message.role == Role::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_grow_the_placeholder_in_order() {
        let mut conv = Conversation::new();
        conv.switch_subject("video:a");
        conv.begin_turn("what is the claim?");
        conv.append_fragment("The claim ");
        conv.append_fragment("is growth.");
        assert_eq!(conv.finish_turn(), "The claim is growth.");
        assert_eq!(
            conv.history_for_request(),
            vec![
                ChatMessage::user("what is the claim?"),
                ChatMessage::assistant("The claim is growth."),
            ]
        );
    }

    #[test]
    fn open_placeholder_is_not_part_of_history() {
        let mut conv = Conversation::new();
        conv.begin_turn("q");
        conv.append_fragment("partial");
        assert_eq!(conv.history_for_request(), vec![ChatMessage::user("q")]);
    }

    #[test]
    fn failed_turn_is_marked_and_excluded_from_history() {
        let mut conv = Conversation::new();
        conv.begin_turn("q1");
        conv.fail_turn(&"upstream returned status 401: bad key");
        let last = conv.entries().last().unwrap();
        assert!(last.is_error);
        assert_eq!(last.message.content, "Error: upstream returned status 401: bad key");
        assert!(!conv.is_turn_open());

        conv.begin_turn("q2");
        assert_eq!(
            conv.history_for_request(),
            vec![ChatMessage::user("q1"), ChatMessage::user("q2")]
        );
    }

    #[test]
    fn switching_subject_resets_history() {
        let mut conv = Conversation::new();
        assert!(conv.switch_subject("video:a"));
        conv.begin_turn("q");
        conv.finish_turn();
        assert!(!conv.switch_subject("video:a"));
        assert_eq!(conv.entries().len(), 2);
        assert!(conv.switch_subject("video:b"));
        assert!(conv.entries().is_empty());
        assert_eq!(conv.subject(), Some("video:b"));
    }

    #[test]
    fn fragments_after_finish_are_ignored() {
        let mut conv = Conversation::new();
        conv.begin_turn("q");
        conv.finish_turn();
        conv.append_fragment("late");
        assert_eq!(conv.entries()[1].message.content, "");
    }
}
