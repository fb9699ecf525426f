use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body accepted by the proxy endpoint and forwarded to the upstream.
///
/// `api_key` and `course_name` are relayed as headers, not only as body
/// fields; blank values count as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub retrieval_only: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            api_key: None,
            course_name: None,
            stream: true,
            temperature: DEFAULT_TEMPERATURE,
            retrieval_only: false,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    pub fn course_name(&self) -> Option<&str> {
        non_blank(self.course_name.as_deref())
    }

    /// The turn being answered.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_stream() -> bool {
    true
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_optional_fields_take_defaults() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{ "role": "user", "content": "hello" }]
        }))
        .unwrap();
        assert!(req.stream);
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
        assert!(!req.retrieval_only);
        assert_eq!(req.api_key(), None);
        assert_eq!(req.last_message().unwrap().content, "hello");
    }

    #[test]
    fn blank_credentials_are_absent() {
        let mut req = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        req.api_key = Some("  ".to_string());
        req.course_name = Some("econ".to_string());
        assert_eq!(req.api_key(), None);
        assert_eq!(req.course_name(), Some("econ"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<ChatRequest>(json!({
            "model": "m",
            "messages": [{ "role": "tool", "content": "x" }]
        }));
        assert!(parsed.is_err());
    }
}
