use chrono::NaiveDateTime;

/// Slack user id (e.g. `U024BE7LH`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

/// Slack channel id (e.g. `C024BE91L`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

/// Slack message timestamp, an opaque string that doubles as the message id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageTs(pub String);

/// Incoming message event, validated at the boundary.
///
/// The adapter converts raw platform payloads into this union before anything
/// enters the core, so the core never branches on loosely-typed maps.
#[derive(Clone, Debug)]
pub enum MessageEvent {
    New(NewMessage),
    Edited(EditedMessage),
}

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub channel: ChannelId,
    pub user: UserId,
    pub text: String,
    pub ts: MessageTs,
    pub thread_ts: Option<MessageTs>,
}

/// An edited message carries both the edit event's own timestamp and the
/// timestamp of the original message (permalinks resolve against the latter).
#[derive(Clone, Debug)]
pub struct EditedMessage {
    pub channel: ChannelId,
    pub user: UserId,
    pub text: String,
    pub ts: MessageTs,
    pub original_ts: MessageTs,
    pub thread_ts: Option<MessageTs>,
}

impl MessageEvent {
    pub fn channel(&self) -> &ChannelId {
        match self {
            MessageEvent::New(m) => &m.channel,
            MessageEvent::Edited(m) => &m.channel,
        }
    }

    pub fn author(&self) -> &UserId {
        match self {
            MessageEvent::New(m) => &m.user,
            MessageEvent::Edited(m) => &m.user,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            MessageEvent::New(m) => &m.text,
            MessageEvent::Edited(m) => &m.text,
        }
    }

    /// Timestamp of this delivery (the edit event's own ts for edits).
    pub fn ts(&self) -> &MessageTs {
        match self {
            MessageEvent::New(m) => &m.ts,
            MessageEvent::Edited(m) => &m.ts,
        }
    }

    pub fn thread_ts(&self) -> Option<&MessageTs> {
        match self {
            MessageEvent::New(m) => m.thread_ts.as_ref(),
            MessageEvent::Edited(m) => m.thread_ts.as_ref(),
        }
    }
}

/// One wall-clock instant as written in the message: a naive datetime plus
/// the raw zone-abbreviation token that accompanied it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Moment {
    pub time: NaiveDateTime,
    pub zone_abbrev: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpressionKind {
    Point,
    Range,
}

/// A matched temporal expression. Immutable once produced by the extractor.
#[derive(Clone, Debug)]
pub struct TemporalExpression {
    /// Byte offsets of the span within the original message text.
    pub start_offset: usize,
    pub end_offset: usize,
    /// Verbatim span text.
    pub text: String,
    pub kind: ExpressionKind,
    pub start: Moment,
    /// Present iff `kind` is `Range`.
    pub end: Option<Moment>,
}

impl TemporalExpression {
    pub fn point(start_offset: usize, end_offset: usize, text: String, start: Moment) -> Self {
        Self {
            start_offset,
            end_offset,
            text,
            kind: ExpressionKind::Point,
            start,
            end: None,
        }
    }

    pub fn range(
        start_offset: usize,
        end_offset: usize,
        text: String,
        start: Moment,
        end: Moment,
    ) -> Self {
        Self {
            start_offset,
            end_offset,
            text,
            kind: ExpressionKind::Range,
            start,
            end: Some(end),
        }
    }
}
