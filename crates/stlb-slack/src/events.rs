//! Boundary validation of raw Slack event payloads.
//!
//! Everything loosely typed stops here: a payload either becomes a
//! [`MessageEvent`] the core can process, is ignored (`Ok(None)`), or is
//! rejected as malformed.

use serde_json::Value;

use stlb_core::{
    domain::{ChannelId, EditedMessage, MessageEvent, MessageTs, NewMessage, UserId},
    errors::Error,
    Result,
};

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::External(format!("malformed event: missing field {key:?}")))
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(|s| s.to_string())
}

/// Convert a raw `message` event into a typed core event.
///
/// Returns `Ok(None)` for payloads the bot deliberately ignores: non-message
/// events and message subtypes other than `message_changed` (joins, deletes,
/// bot messages and so on).
pub fn parse_event(raw: &Value) -> Result<Option<MessageEvent>> {
    if raw.get("type").and_then(Value::as_str) != Some("message") {
        return Ok(None);
    }
    let channel = ChannelId(str_field(raw, "channel")?.to_string());

    match raw.get("subtype").and_then(Value::as_str) {
        None => {
            let event = NewMessage {
                channel,
                user: UserId(str_field(raw, "user")?.to_string()),
                text: str_field(raw, "text")?.to_string(),
                ts: MessageTs(str_field(raw, "ts")?.to_string()),
                thread_ts: opt_str(raw, "thread_ts").map(MessageTs),
            };
            Ok(Some(MessageEvent::New(event)))
        }
        Some("message_changed") => {
            let inner = raw
                .get("message")
                .ok_or_else(|| Error::External("malformed edit: missing message".into()))?;
            let event = EditedMessage {
                channel,
                user: UserId(str_field(inner, "user")?.to_string()),
                text: str_field(inner, "text")?.to_string(),
                ts: MessageTs(str_field(raw, "ts")?.to_string()),
                original_ts: MessageTs(str_field(inner, "ts")?.to_string()),
                thread_ts: opt_str(inner, "thread_ts").map(MessageTs),
            };
            Ok(Some(MessageEvent::Edited(event)))
        }
        Some(_) => Ok(None),
    }
}
