/// Core error type.
///
/// The adapter crate maps platform-specific failures into this taxonomy so
/// the fan-out controller can apply one propagation policy: recipient-local
/// failures skip that recipient, only author resolution failure aborts an
/// event, and nothing here is ever fatal to the hosting process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unresolved zone abbreviation: {0}")]
    UnresolvedZone(String),

    #[error("user lookup failed for {user}: {reason}")]
    UserLookupFailed { user: String, reason: String },

    #[error("permalink unavailable: {0}")]
    PermalinkUnavailable(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
