use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as broadcast to every connected participant.
///
/// Only the body ever comes from the wire; `name` and `when` are stamped by
/// the inbound pump of the connection that received the frame, so clients
/// cannot spoof either.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "When")]
    pub when: DateTime<Utc>,
}

impl Message {
    /// Build a message from a client-supplied body, stamping the sender
    /// name and the current time.
    pub fn stamped(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: body.into(),
            when: Utc::now(),
        }
    }
}

/// What a client sends over the wire: just the body.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "Message")]
    pub message: String,
}
