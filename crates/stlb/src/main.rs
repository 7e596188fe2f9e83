//! Bot entry point.
//!
//! Gateway connectivity is deliberately not part of this binary: it consumes
//! newline-delimited Slack event JSON on stdin, the seam a socket-mode front
//! end (or a test harness) feeds. Each event is processed concurrently;
//! pipeline failures are logged and never fatal.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use stlb_core::{
    config::Config, extract::RegexExtractor, fanout::Pipeline, user_cache::UserCache,
};
use stlb_slack::SlackClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stlb_core::logging::init("stlb")?;

    let cfg = Arc::new(Config::load()?);
    let slack = Arc::new(SlackClient::new(
        cfg.slack_bot_token.clone(),
        cfg.api_timeout,
    )?);
    let cache = Arc::new(UserCache::new(
        slack.clone(),
        cfg.user_cache_size,
        cfg.user_cache_ttl,
    ));
    let pipeline = Arc::new(Pipeline::new(
        cfg,
        cache,
        Arc::new(RegexExtractor::new()),
        slack.clone(),
        slack,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let raw: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("discarding undecodable event: {e}");
                continue;
            }
        };
        match stlb_slack::events::parse_event(&raw) {
            Ok(Some(event)) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    if let Err(e) = pipeline.process(&event).await {
                        tracing::warn!("event processing failed: {e}");
                    }
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("discarding malformed event: {e}"),
        }
    }

    Ok(())
}
