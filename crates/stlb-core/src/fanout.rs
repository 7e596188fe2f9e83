//! Recipient fan-out: drives one message event end-to-end.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    compose::compose,
    config::Config,
    domain::{ChannelId, MessageEvent, MessageTs, UserId},
    errors::Error,
    localize::localize,
    ports::{DeliveryPort, DirectoryPort, ExtractionPort},
    user_cache::{UserCache, UserRecord},
    zones, Result,
};

/// Orchestrates one message event: resolve the author, extract expressions,
/// enumerate members, then localize + compose + dispatch one ephemeral
/// notification per distinct eligible recipient.
///
/// Failure policy: only author resolution failure aborts the event; failures
/// local to one recipient skip that recipient, delivery failures are logged
/// and never retried here.
pub struct Pipeline {
    cfg: Arc<Config>,
    cache: Arc<UserCache>,
    extractor: Arc<dyn ExtractionPort>,
    directory: Arc<dyn DirectoryPort>,
    delivery: Arc<dyn DeliveryPort>,
    // Best-effort guard against exact duplicate redeliveries. The upstream
    // platform's redelivery semantics are unconfirmed, so this is a small
    // in-memory window rather than durable idempotency state.
    recent: Mutex<VecDeque<(ChannelId, MessageTs, Instant)>>,
}

impl Pipeline {
    pub fn new(
        cfg: Arc<Config>,
        cache: Arc<UserCache>,
        extractor: Arc<dyn ExtractionPort>,
        directory: Arc<dyn DirectoryPort>,
        delivery: Arc<dyn DeliveryPort>,
    ) -> Self {
        Self {
            cfg,
            cache,
            extractor,
            directory,
            delivery,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Bound an external call by the configured timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.cfg.api_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(Error::External(format!(
                    "external call timed out after {:?}",
                    self.cfg.api_timeout
                )))
            })
    }

    async fn resolve_user(&self, id: &UserId) -> Result<UserRecord> {
        self.bounded(self.cache.get(id)).await.map_err(|e| match e {
            e @ Error::UserLookupFailed { .. } => e,
            other => Error::UserLookupFailed {
                user: id.0.clone(),
                reason: other.to_string(),
            },
        })
    }

    /// Record `(channel, ts)` as processed; false when it was already seen
    /// within the dedup window.
    async fn mark_processed(&self, channel: &ChannelId, ts: &MessageTs) -> bool {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        while recent
            .front()
            .map_or(false, |(_, _, at)| now.duration_since(*at) > self.cfg.dedup_window)
        {
            recent.pop_front();
        }
        if recent.iter().any(|(c, t, _)| c == channel && t == ts) {
            return false;
        }
        recent.push_back((channel.clone(), ts.clone(), now));
        true
    }

    pub async fn process(&self, event: &MessageEvent) -> Result<()> {
        let channel = event.channel();
        if !self.mark_processed(channel, event.ts()).await {
            debug!("duplicate delivery of {}:{}, skipping", channel.0, event.ts().0);
            return Ok(());
        }

        // Author resolution is mandatory; bot-authored content is ignored.
        let author = self.resolve_user(event.author()).await?;
        if author.is_bot {
            return Ok(());
        }

        let reference = Utc::now().with_timezone(&author.timezone);
        let expressions = match self.extractor.extract(event.text(), reference).await {
            Ok(exprs) => exprs,
            Err(e) => {
                debug!("extraction failed, treating as no expressions: {e}");
                Vec::new()
            }
        };
        if expressions.is_empty() {
            return Ok(());
        }

        // Permalinks resolve against the original message's timestamp; a
        // failure degrades to omitting the "edited" prefix.
        let edited_from = match event {
            MessageEvent::Edited(m) => {
                match self.bounded(self.directory.permalink(channel, &m.original_ts)).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!("permalink unavailable for {}:{}: {e}", channel.0, m.original_ts.0);
                        None
                    }
                }
            }
            MessageEvent::New(_) => None,
        };

        let members = self.bounded(self.directory.list_members(channel)).await?;

        let mut seen: HashSet<UserId> = HashSet::new();
        for member in &members {
            if !seen.insert(member.clone()) {
                continue;
            }
            let record = match self.resolve_user(member).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping member {}: {e}", member.0);
                    continue;
                }
            };
            if record.is_bot {
                continue;
            }
            if record.id == author.id && !self.cfg.notify_author {
                continue;
            }

            // A conversion into the zone the time was written in is a no-op;
            // such expressions are dropped per member.
            let mut blocks = Vec::new();
            for expr in &expressions {
                let source = match zones::resolve(&expr.start.zone_abbrev) {
                    Ok(res) => res,
                    Err(e) => {
                        debug!("ignoring expression {:?}: {e}", expr.text);
                        continue;
                    }
                };
                if source.tz == record.timezone {
                    continue;
                }
                match localize(expr, record.timezone, self.cfg.clock) {
                    Ok(line) => blocks.push((expr, line)),
                    Err(e) => debug!("ignoring expression {:?}: {e}", expr.text),
                }
            }
            if blocks.is_empty() {
                continue;
            }

            let body = compose(&blocks, edited_from.as_deref());
            if let Err(e) = self
                .bounded(self.delivery.send_ephemeral(
                    channel,
                    &record.id,
                    &body,
                    event.thread_ts(),
                ))
                .await
            {
                warn!("delivery to {} failed: {e}", record.id.0);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EditedMessage, Moment, NewMessage, TemporalExpression};
    use crate::ports::UserProfile;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use chrono_tz::Tz;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeDirectory {
        users: HashMap<String, UserProfile>,
        members: Vec<String>,
        permalink: Option<String>,
        failing_users: Vec<String>,
        permalink_calls: StdMutex<Vec<(String, String)>>,
    }

    impl FakeDirectory {
        fn new(members: &[&str]) -> Self {
            Self {
                users: HashMap::new(),
                members: members.iter().map(|s| s.to_string()).collect(),
                permalink: None,
                failing_users: Vec::new(),
                permalink_calls: StdMutex::new(Vec::new()),
            }
        }

        fn with_user(mut self, id: &str, tz: &str, is_bot: bool) -> Self {
            self.users.insert(
                id.to_string(),
                UserProfile {
                    display_name: id.to_string(),
                    timezone: tz.to_string(),
                    is_bot,
                },
            );
            self
        }
    }

    #[async_trait]
    impl DirectoryPort for FakeDirectory {
        async fn lookup_user(&self, user: &UserId) -> Result<UserProfile> {
            if self.failing_users.contains(&user.0) {
                return Err(Error::UserLookupFailed {
                    user: user.0.clone(),
                    reason: "directory timeout".into(),
                });
            }
            self.users
                .get(&user.0)
                .cloned()
                .ok_or_else(|| Error::UserLookupFailed {
                    user: user.0.clone(),
                    reason: "unknown user".into(),
                })
        }

        async fn list_members(&self, _channel: &ChannelId) -> Result<Vec<UserId>> {
            Ok(self.members.iter().cloned().map(UserId).collect())
        }

        async fn permalink(&self, channel: &ChannelId, ts: &MessageTs) -> Result<String> {
            self.permalink_calls
                .lock()
                .unwrap()
                .push((channel.0.clone(), ts.0.clone()));
            self.permalink
                .clone()
                .ok_or_else(|| Error::PermalinkUnavailable("no permalink".into()))
        }
    }

    #[derive(Default)]
    struct FakeDelivery {
        sends: StdMutex<Vec<(String, String, String, Option<String>)>>,
    }

    impl FakeDelivery {
        fn sent(&self) -> Vec<(String, String, String, Option<String>)> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryPort for FakeDelivery {
        async fn send_ephemeral(
            &self,
            channel: &ChannelId,
            user: &UserId,
            body: &str,
            thread: Option<&MessageTs>,
        ) -> Result<()> {
            self.sends.lock().unwrap().push((
                channel.0.clone(),
                user.0.clone(),
                body.to_string(),
                thread.map(|t| t.0.clone()),
            ));
            Ok(())
        }
    }

    struct FixedExtractor {
        expressions: Vec<TemporalExpression>,
    }

    #[async_trait]
    impl ExtractionPort for FixedExtractor {
        async fn extract(
            &self,
            _text: &str,
            _reference: DateTime<Tz>,
        ) -> Result<Vec<TemporalExpression>> {
            Ok(self.expressions.clone())
        }
    }

    fn moment(h: u32, m: u32, abbrev: &str) -> Moment {
        Moment {
            time: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
            zone_abbrev: abbrev.to_string(),
        }
    }

    fn gmt_point() -> TemporalExpression {
        TemporalExpression::point(11, 23, "at 10:30 GMT".into(), moment(10, 30, "GMT"))
    }

    fn pipeline(
        directory: FakeDirectory,
        expressions: Vec<TemporalExpression>,
        cfg: Config,
    ) -> (Arc<FakeDelivery>, Pipeline) {
        let cfg = Arc::new(cfg);
        let directory = Arc::new(directory);
        let cache = Arc::new(UserCache::new(
            directory.clone(),
            cfg.user_cache_size,
            cfg.user_cache_ttl,
        ));
        let delivery = Arc::new(FakeDelivery::default());
        let p = Pipeline::new(
            cfg,
            cache,
            Arc::new(FixedExtractor { expressions }),
            directory,
            delivery.clone(),
        );
        (delivery, p)
    }

    fn new_message(text: &str) -> MessageEvent {
        MessageEvent::New(NewMessage {
            channel: ChannelId("some-channel".into()),
            user: UserId("some-user".into()),
            text: text.to_string(),
            ts: MessageTs("some-ts".into()),
            thread_ts: None,
        })
    }

    #[tokio::test]
    async fn gmt_point_notifies_every_member_with_fallback() {
        let directory = FakeDirectory::new(&["some-user", "some-other-user"])
            .with_user("some-user", "Europe/Amsterdam", false)
            .with_user("some-other-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 2);
        for (channel, _user, body, thread) in &sent {
            assert_eq!(channel, "some-channel");
            assert_eq!(
                body,
                "> at 10:30 GMT\n_10:30 (GMT)_ ➔ _11:30 (Europe/Amsterdam)_ or _10:30 (UTC)_"
            );
            assert_eq!(thread.as_deref(), None);
        }
    }

    #[tokio::test]
    async fn utc_source_has_no_or_clause() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let expr =
            TemporalExpression::point(11, 23, "at 10:30 UTC".into(), moment(10, 30, "UTC"));
        let (delivery, p) = pipeline(directory, vec![expr], Config::default());

        p.process(&new_message("Let's meet at 10:30 UTC.")).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].2,
            "> at 10:30 UTC\n_10:30 (UTC)_ ➔ _11:30 (Europe/Amsterdam)_"
        );
    }

    #[tokio::test]
    async fn range_expression_converts_both_bounds() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let expr = TemporalExpression::range(
            9,
            37,
            "between at 5:00 and 7:00 CET".into(),
            moment(5, 0, "CET"),
            moment(7, 0, "CET"),
        );
        let (delivery, p) = pipeline(directory, vec![expr], Config::default());

        p.process(&new_message("starting between at 5:00 and 7:00 CET"))
            .await
            .unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].2,
            "> between at 5:00 and 7:00 CET\n_05:00 - 07:00 (CET)_ ➔ _05:00 - 07:00 (Europe/Amsterdam)_ or _04:00 - 06:00 (UTC)_"
        );
    }

    #[tokio::test]
    async fn edit_event_prefixes_body_and_uses_original_ts() {
        let mut directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        directory.permalink = Some("https://mockpermalink".into());
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        let event = MessageEvent::Edited(EditedMessage {
            channel: ChannelId("some-channel".into()),
            user: UserId("some-user".into()),
            text: "Let's meet at 10:30 GMT.".into(),
            ts: MessageTs("some-other-ts".into()),
            original_ts: MessageTs("some-ts".into()),
            thread_ts: None,
        });
        p.process(&event).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].2,
            "_<https://mockpermalink|Message> edited:_\n> at 10:30 GMT\n_10:30 (GMT)_ ➔ _11:30 (Europe/Amsterdam)_ or _10:30 (UTC)_"
        );
    }

    #[tokio::test]
    async fn permalink_failure_omits_the_edit_prefix() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        let event = MessageEvent::Edited(EditedMessage {
            channel: ChannelId("some-channel".into()),
            user: UserId("some-user".into()),
            text: "Let's meet at 10:30 GMT.".into(),
            ts: MessageTs("some-other-ts".into()),
            original_ts: MessageTs("some-ts".into()),
            thread_ts: None,
        });
        p.process(&event).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.starts_with("> at 10:30 GMT\n"));
    }

    #[tokio::test]
    async fn bot_author_produces_no_notifications() {
        let directory = FakeDirectory::new(&["some-user", "some-other-user"])
            .with_user("some-user", "Europe/Amsterdam", true)
            .with_user("some-other-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn author_lookup_failure_aborts_the_event() {
        let mut directory = FakeDirectory::new(&["some-user"]);
        directory.failing_users.push("some-user".into());
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        let err = p
            .process(&new_message("Let's meet at 10:30 GMT."))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UserLookupFailed { .. }));
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn member_lookup_failure_skips_only_that_member() {
        let mut directory = FakeDirectory::new(&["some-user", "broken-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        directory.failing_users.push("broken-user".into());
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "some-user");
    }

    #[tokio::test]
    async fn bot_members_are_skipped() {
        let directory = FakeDirectory::new(&["some-user", "bot-user"])
            .with_user("some-user", "Europe/Amsterdam", false)
            .with_user("bot-user", "Europe/Amsterdam", true);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();
        assert_eq!(delivery.sent().len(), 1);
    }

    #[tokio::test]
    async fn members_in_the_source_zone_get_no_notice() {
        // CET resolves to the CET zone; a member configured to CET would see
        // a no-op conversion.
        let directory = FakeDirectory::new(&["some-user", "cet-user"])
            .with_user("some-user", "Europe/Amsterdam", false)
            .with_user("cet-user", "CET", false);
        let expr =
            TemporalExpression::point(11, 23, "at 10:30 CET".into(), moment(10, 30, "CET"));
        let (delivery, p) = pipeline(directory, vec![expr], Config::default());

        p.process(&new_message("Let's meet at 10:30 CET.")).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "some-user");
    }

    #[tokio::test]
    async fn duplicate_member_ids_get_a_single_notice() {
        let directory = FakeDirectory::new(&["some-user", "some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();
        assert_eq!(delivery.sent().len(), 1);
    }

    #[tokio::test]
    async fn no_expressions_is_a_no_op() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, Vec::new(), Config::default());

        p.process(&new_message("some-text-without-temporal_expressions"))
            .await
            .unwrap();
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn unresolved_zone_expressions_are_ignored() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let expr =
            TemporalExpression::point(11, 23, "at 10:30 XYZ".into(), moment(10, 30, "XYZ"));
        let (delivery, p) = pipeline(directory, vec![expr], Config::default());

        p.process(&new_message("Let's meet at 10:30 XYZ.")).await.unwrap();
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn redelivered_event_is_suppressed_within_the_window() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        let event = new_message("Let's meet at 10:30 GMT.");
        p.process(&event).await.unwrap();
        p.process(&event).await.unwrap();
        assert_eq!(delivery.sent().len(), 1);
    }

    #[tokio::test]
    async fn notify_author_policy_can_exclude_the_author() {
        let directory = FakeDirectory::new(&["some-user", "some-other-user"])
            .with_user("some-user", "Europe/Amsterdam", false)
            .with_user("some-other-user", "Europe/Amsterdam", false);
        let cfg = Config {
            notify_author: false,
            ..Config::default()
        };
        let (delivery, p) = pipeline(directory, vec![gmt_point()], cfg);

        p.process(&new_message("Let's meet at 10:30 GMT.")).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "some-other-user");
    }

    #[tokio::test]
    async fn thread_scope_is_propagated_to_delivery() {
        let directory = FakeDirectory::new(&["some-user"])
            .with_user("some-user", "Europe/Amsterdam", false);
        let (delivery, p) = pipeline(directory, vec![gmt_point()], Config::default());

        let event = MessageEvent::New(NewMessage {
            channel: ChannelId("some-channel".into()),
            user: UserId("some-user".into()),
            text: "Let's meet at 10:30 GMT.".into(),
            ts: MessageTs("some-ts".into()),
            thread_ts: Some(MessageTs("thread-ts".into())),
        });
        p.process(&event).await.unwrap();

        let sent = delivery.sent();
        assert_eq!(sent[0].3.as_deref(), Some("thread-ts"));
    }
}
