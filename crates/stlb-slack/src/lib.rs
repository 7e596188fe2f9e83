//! Slack Web API adapter.
//!
//! Implements the `stlb-core` directory and delivery ports over the Slack
//! Web API (`users.info`, `conversations.members`, `chat.getPermalink`,
//! `chat.postEphemeral`). Gateway/socket connectivity is a separate concern;
//! see the `events` module for the boundary into typed core events.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use stlb_core::{
    domain::{ChannelId, MessageTs, UserId},
    errors::Error,
    ports::{DeliveryPort, DirectoryPort, UserProfile},
    Result,
};

pub mod events;

const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
}

impl SlackClient {
    /// `timeout` bounds every request this client issues.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
        })
    }

    fn check_ok(method: &str, v: Value) -> Result<Value> {
        if v.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(v);
        }
        let reason = v
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Err(Error::External(format!("slack {method} failed: {reason}")))
    }

    async fn get_json(&self, method: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::External(format!("slack {method} request error: {e}")))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("slack {method} returned invalid json: {e}")))?;
        Self::check_ok(method, v)
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::External(format!("slack {method} request error: {e}")))?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("slack {method} returned invalid json: {e}")))?;
        Self::check_ok(method, v)
    }
}

/// The mrkdwn section block carrying one notice, with a dismiss button.
pub fn notice_blocks(body: &str) -> Value {
    json!([
        {
            "type": "section",
            "text": {
                "text": body,
                "type": "mrkdwn",
            },
            "accessory": {
                "type": "button",
                "action_id": "dismiss",
                "accessibility_label": "Dismiss this message",
                "text": {
                    "type": "plain_text",
                    "text": "X",
                },
            },
        }
    ])
}

#[async_trait]
impl DirectoryPort for SlackClient {
    async fn lookup_user(&self, user: &UserId) -> Result<UserProfile> {
        let v = self
            .get_json("users.info", &[("user", user.0.as_str())])
            .await
            .map_err(|e| Error::UserLookupFailed {
                user: user.0.clone(),
                reason: e.to_string(),
            })?;
        let u = v.get("user").ok_or_else(|| Error::UserLookupFailed {
            user: user.0.clone(),
            reason: "users.info response has no user object".into(),
        })?;
        let timezone = u
            .get("tz")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UserLookupFailed {
                user: user.0.clone(),
                reason: "user has no timezone".into(),
            })?;
        Ok(UserProfile {
            display_name: u
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&user.0)
                .to_string(),
            timezone: timezone.to_string(),
            is_bot: u.get("is_bot").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    async fn list_members(&self, channel: &ChannelId) -> Result<Vec<UserId>> {
        let mut members = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("channel", channel.0.as_str()), ("limit", "200")];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let v = self.get_json("conversations.members", &query).await?;
            if let Some(page) = v.get("members").and_then(Value::as_array) {
                members.extend(
                    page.iter()
                        .filter_map(Value::as_str)
                        .map(|s| UserId(s.to_string())),
                );
            }
            cursor = v
                .get("response_metadata")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if cursor.is_empty() {
                return Ok(members);
            }
        }
    }

    async fn permalink(&self, channel: &ChannelId, ts: &MessageTs) -> Result<String> {
        let v = self
            .get_json(
                "chat.getPermalink",
                &[("channel", channel.0.as_str()), ("message_ts", ts.0.as_str())],
            )
            .await
            .map_err(|e| Error::PermalinkUnavailable(e.to_string()))?;
        v.get("permalink")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::PermalinkUnavailable("chat.getPermalink response has no permalink".into())
            })
    }
}

#[async_trait]
impl DeliveryPort for SlackClient {
    async fn send_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        body: &str,
        thread: Option<&MessageTs>,
    ) -> Result<()> {
        let mut payload = json!({
            "channel": channel.0,
            "user": user.0,
            "blocks": notice_blocks(body),
        });
        if let Some(t) = thread {
            payload["thread_ts"] = json!(t.0);
        }
        self.post_json("chat.postEphemeral", &payload)
            .await
            .map_err(|e| Error::DeliveryFailed(e.to_string()))?;
        Ok(())
    }
}
