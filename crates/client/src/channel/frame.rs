//! Live channel frames and dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ChatMessage;

/// A frame that could not be turned into an action.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no type tag")]
    MissingType,

    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    NewMessage(ChatMessage),
    OnlineCount { count: u64 },
    NewsUpdate,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value.get("type").and_then(Value::as_str).ok_or(FrameError::MissingType)?;
        match kind {
            "new_message" | "online_count" | "news_update" => Ok(serde_json::from_value(value)?),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

/// Client-to-server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// `timestamp` is milliseconds since the epoch.
    Message { content: String, timestamp: i64 },
}

impl OutboundFrame {
    pub fn message(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        OutboundFrame::Message { content: content.into(), timestamp: now.timestamp_millis() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// What the page should do in response to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    AppendMessage { message: ChatMessage, own: bool },
    SetOnlineCount(u64),
    ReloadNews,
    /// Refetch the whole message list; emitted on every open.
    ReloadMessages,
}

/// Map an inbound frame to an action for the user `username`.
pub fn dispatch(frame: InboundFrame, username: &str) -> ChannelAction {
    match frame {
        InboundFrame::NewMessage(message) => {
            let own = message.sender == username;
            ChannelAction::AppendMessage { message, own }
        }
        InboundFrame::OnlineCount { count } => ChannelAction::SetOnlineCount(count),
        InboundFrame::NewsUpdate => ChannelAction::ReloadNews,
    }
}
