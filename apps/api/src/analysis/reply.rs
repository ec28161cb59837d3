//! Reply normalization: collapses the model's reply shape into one plain string.
//!
//! Providers hand back either a bare string or an object with a nested
//! `message.content` field. That ambiguity ends here; the parser only ever sees text.

use serde::Deserialize;
use serde_json::Value;

/// The two shapes a model reply can take.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelReply {
    Text(String),
    Message(ReplyEnvelope),
}

/// Object-shaped reply: `{"message": {"content": "..."}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(default)]
    pub message: Option<ReplyMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

impl ModelReply {
    /// Strings pass through unchanged. Objects yield their nested content, or ""
    /// when the field is missing or not a string.
    pub fn into_text(self) -> String {
        match self {
            ModelReply::Text(text) => text,
            ModelReply::Message(envelope) => envelope
                .message
                .and_then(|m| m.content)
                .and_then(|c| match c {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .unwrap_or_default(),
        }
    }
}

impl From<String> for ModelReply {
    fn from(text: String) -> Self {
        ModelReply::Text(text)
    }
}
