//! Built-in temporal-expression extractor.
//!
//! Extraction proper is an external concern behind [`ExtractionPort`]; this
//! default implementation covers the explicit `H:MM ZONE` shapes ("at 10:30
//! GMT", "between at 5:00 and 7:00 CET") so the bot works out of the box.
//! Anything fancier (relative dates, natural language) belongs in a separate
//! implementation of the port.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;
use regex::Regex;

use crate::{
    domain::{Moment, TemporalExpression},
    ports::ExtractionPort,
    Result,
};

pub struct RegexExtractor {
    re: Regex,
}

impl RegexExtractor {
    pub fn new() -> Self {
        // Token after the time(s) is only a candidate zone label; the zone
        // table decides later whether it resolves.
        let re = Regex::new(
            r"(?i)\b(?:between\s+)?(?:at\s+)?(\d{1,2}):(\d{2})(?:\s+and\s+(\d{1,2}):(\d{2}))?\s+([A-Za-z]{2,5})\b",
        )
        .expect("valid regex");
        Self { re }
    }
}

impl Default for RegexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_time(hours: &str, minutes: &str) -> Option<NaiveTime> {
    let h: u32 = hours.parse().ok()?;
    let m: u32 = minutes.parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

#[async_trait]
impl ExtractionPort for RegexExtractor {
    async fn extract(
        &self,
        text: &str,
        reference: DateTime<Tz>,
    ) -> Result<Vec<TemporalExpression>> {
        let date = reference.date_naive();
        let mut out = Vec::new();

        for caps in self.re.captures_iter(text) {
            let whole = caps.get(0).expect("group 0 always present");
            let Some(start_time) = parse_time(&caps[1], &caps[2]) else {
                continue;
            };
            let zone_abbrev = caps[5].to_string();
            let start = Moment {
                time: date.and_time(start_time),
                zone_abbrev: zone_abbrev.clone(),
            };

            let expr = match (caps.get(3), caps.get(4)) {
                (Some(h), Some(m)) => {
                    let Some(end_time) = parse_time(h.as_str(), m.as_str()) else {
                        continue;
                    };
                    TemporalExpression::range(
                        whole.start(),
                        whole.end(),
                        whole.as_str().to_string(),
                        start,
                        Moment {
                            time: date.and_time(end_time),
                            zone_abbrev,
                        },
                    )
                }
                _ => TemporalExpression::point(
                    whole.start(),
                    whole.end(),
                    whole.as_str().to_string(),
                    start,
                ),
            };
            out.push(expr);
        }

        Ok(out)
    }
}
