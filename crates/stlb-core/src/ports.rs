use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::{
    domain::{ChannelId, MessageTs, TemporalExpression, UserId},
    Result,
};

/// Directory entry as the platform reports it; the cache parses the timezone.
#[derive(Clone, Debug)]
pub struct UserProfile {
    pub display_name: String,
    pub timezone: String,
    pub is_bot: bool,
}

/// Temporal-expression extraction seam.
///
/// The built-in regex extractor is one implementation; an NLP-backed one can
/// sit behind the same trait. Failure is non-fatal and treated by the caller
/// as "no expressions found".
#[async_trait]
pub trait ExtractionPort: Send + Sync {
    /// `reference` anchors bare wall-clock times on a concrete date, in the
    /// zone the message was presumably written in (the author's).
    async fn extract(&self, text: &str, reference: DateTime<Tz>)
        -> Result<Vec<TemporalExpression>>;
}

/// User directory and channel membership lookups.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn lookup_user(&self, user: &UserId) -> Result<UserProfile>;
    async fn list_members(&self, channel: &ChannelId) -> Result<Vec<UserId>>;
    async fn permalink(&self, channel: &ChannelId, ts: &MessageTs) -> Result<String>;
}

/// Notification delivery. Fire-and-forget from the core's perspective:
/// failures are logged by the caller, never retried here.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn send_ephemeral(
        &self,
        channel: &ChannelId,
        user: &UserId,
        body: &str,
        thread: Option<&MessageTs>,
    ) -> Result<()>;
}
