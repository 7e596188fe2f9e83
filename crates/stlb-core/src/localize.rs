//! Conversion of one temporal expression into a recipient's timezone.

use chrono::{Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::{
    domain::{ExpressionKind, TemporalExpression},
    errors::Error,
    zones, Result,
};

/// 12-hour vs 24-hour rendering preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockStyle {
    Hour24,
    Hour12,
}

impl ClockStyle {
    fn format(self, t: NaiveDateTime) -> String {
        match self {
            ClockStyle::Hour24 => t.format("%H:%M").to_string(),
            ClockStyle::Hour12 => t.format("%I:%M %p").to_string(),
        }
    }
}

/// One rendered conversion, consumed immediately by the composer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalizedLine {
    pub source: String,
    pub source_label: String,
    pub target: String,
    pub target_label: String,
    /// UTC alternative, present only for ambiguous source labels.
    pub fallback: Option<String>,
}

impl LocalizedLine {
    pub fn render(&self) -> String {
        let mut out = format!(
            "_{} ({})_ ➔ _{} ({})_",
            self.source, self.source_label, self.target, self.target_label
        );
        if let Some(fb) = &self.fallback {
            out.push_str(&format!(" or _{fb} (UTC)_"));
        }
        out
    }
}

/// Project a naive wall-clock time from one zone into another.
///
/// The full datetime participates so offset arithmetic (DST included) is
/// correct even though only the time of day is displayed. A wall-clock time
/// that falls into a DST gap resolves to the first valid instant after it.
fn project(t: NaiveDateTime, from: Tz, to: Tz) -> Result<NaiveDateTime> {
    let instant = from
        .from_local_datetime(&t)
        .earliest()
        .or_else(|| from.from_local_datetime(&(t + Duration::hours(1))).earliest())
        .ok_or_else(|| Error::InvalidTimezone(format!("{t} is not a valid time in {from}")))?;
    Ok(instant.with_timezone(&to).naive_local())
}

/// Localize one expression into `target`, applying the UTC-fallback rule.
///
/// Ambiguity never blocks conversion: an ambiguous source label converts
/// normally and additionally carries the UTC rendering, except when the
/// label itself is already `UTC`.
pub fn localize(
    expr: &TemporalExpression,
    target: Tz,
    clock: ClockStyle,
) -> Result<LocalizedLine> {
    let res = zones::resolve(&expr.start.zone_abbrev)?;
    let source_label = expr.start.zone_abbrev.to_ascii_uppercase();
    let wants_fallback = res.ambiguous && source_label != "UTC";

    let (source, target_str, fallback) = match (expr.kind, &expr.end) {
        (ExpressionKind::Range, Some(end)) => {
            let tgt_start = project(expr.start.time, res.tz, target)?;
            let tgt_end = project(end.time, res.tz, target)?;
            let fb = if wants_fallback {
                Some(format!(
                    "{} - {}",
                    clock.format(project(expr.start.time, res.tz, Tz::UTC)?),
                    clock.format(project(end.time, res.tz, Tz::UTC)?),
                ))
            } else {
                None
            };
            (
                format!(
                    "{} - {}",
                    clock.format(expr.start.time),
                    clock.format(end.time)
                ),
                format!("{} - {}", clock.format(tgt_start), clock.format(tgt_end)),
                fb,
            )
        }
        _ => {
            let tgt = project(expr.start.time, res.tz, target)?;
            let fb = if wants_fallback {
                Some(clock.format(project(expr.start.time, res.tz, Tz::UTC)?))
            } else {
                None
            };
            (clock.format(expr.start.time), clock.format(tgt), fb)
        }
    };

    Ok(LocalizedLine {
        source,
        source_label,
        target: target_str,
        target_label: target.name().to_string(),
        fallback,
    })
}
