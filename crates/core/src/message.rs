//! Chat message value objects.
//!
//! A stage builds a short list of messages (system instructions followed by
//! the user prompt), the provider sends them, and the exact same list is
//! recorded in the trace of every entity the call produced.

use serde::{Deserialize, Serialize};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The prompt author
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Fold a leading system message into the user message that follows it.
///
/// Some model families reject the system role. The system text is prefixed
/// onto the first user message, separated by a newline. Lists that do not
/// start with a system/user pair are returned unchanged.
pub fn merge_system_into_user(messages: &[Message]) -> Vec<Message> {
    match messages {
        [first, second, rest @ ..] if first.role == Role::System && second.role == Role::User => {
            let mut merged = Vec::with_capacity(messages.len() - 1);
            merged.push(Message::user(format!("{}\n{}", first.content, second.content)));
            merged.extend(rest.iter().cloned());
            merged
        }
        _ => messages.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_string(&Message::system("rules")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"rules"}"#);
    }

    #[test]
    fn merge_prefixes_system_onto_user() {
        let merged = merge_system_into_user(&[Message::system("Be brief."), Message::user("Label these.")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].role, Role::User);
        assert_eq!(merged[0].content, "Be brief.\nLabel these.");
    }

    #[test]
    fn merge_keeps_trailing_messages() {
        let merged = merge_system_into_user(&[
            Message::system("s"),
            Message::user("u"),
            Message::assistant("a"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1], Message::assistant("a"));
    }

    #[test]
    fn merge_without_system_is_identity() {
        let input = vec![Message::user("only user")];
        assert_eq!(merge_system_into_user(&input), input);
    }
}
