//! Inbound update records

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound record from the update endpoint
///
/// `update_id` is strictly increasing on the server side. Every other field of the
/// record is kept untouched in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,

    #[serde(flatten)]
    pub payload: Value,
}

/// Payload fields that carry a chat, in lookup order
const CHAT_CARRIERS: &[&str] = &[
    "message",
    "edited_message",
    "channel_post",
    "edited_channel_post",
];

impl Update {
    pub fn new(update_id: i64, payload: Value) -> Self {
        Self { update_id, payload }
    }

    /// Name of the first payload field, e.g. `message` or `callback_query`
    pub fn kind(&self) -> Option<&str> {
        self.payload
            .as_object()
            .and_then(|fields| fields.keys().next())
            .map(String::as_str)
    }

    /// Chat the update belongs to, if any
    pub fn chat_id(&self) -> Option<i64> {
        CHAT_CARRIERS
            .iter()
            .find_map(|carrier| self.payload.get(carrier))
            .or_else(|| self.payload.pointer("/callback_query/message"))
            .and_then(|message| message.pointer("/chat/id"))
            .and_then(Value::as_i64)
    }

    /// Sender of the update, if any
    pub fn sender_id(&self) -> Option<i64> {
        CHAT_CARRIERS
            .iter()
            .chain(["callback_query", "inline_query"].iter())
            .find_map(|carrier| self.payload.get(carrier))
            .and_then(|inner| inner.pointer("/from/id"))
            .and_then(Value::as_i64)
    }

    /// Text of a message update
    pub fn text(&self) -> Option<&str> {
        self.payload
            .pointer("/message/text")
            .and_then(Value::as_str)
    }
}
