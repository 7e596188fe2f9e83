use chrono_tz::Tz;

use crate::{errors::Error, Result};

/// Result of disambiguating a raw zone-abbreviation token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneResolution {
    pub tz: Tz,
    /// True when colloquial usage of the label is commonly conflated with
    /// UTC, so conversions should carry a UTC fallback line.
    pub ambiguous: bool,
}

/// Map an abbreviation token to its canonical IANA zone.
///
/// `UTC` is the only non-ambiguous entry; every other recognized label is
/// ambiguous by design ("10:30 GMT" frequently means "10:30 UTC-ish").
/// Unknown abbreviations fail with [`Error::UnresolvedZone`]; callers skip
/// the expression rather than aborting the message.
pub fn resolve(abbrev: &str) -> Result<ZoneResolution> {
    let tz = match abbrev.to_ascii_uppercase().as_str() {
        "UTC" => {
            return Ok(ZoneResolution {
                tz: Tz::UTC,
                ambiguous: false,
            })
        }
        "GMT" => Tz::GMT,
        "CET" => Tz::CET,
        "EET" => Tz::EET,
        "WET" => Tz::WET,
        "EST" => Tz::EST,
        "MST" => Tz::MST,
        "HST" => Tz::HST,
        _ => return Err(Error::UnresolvedZone(abbrev.to_string())),
    };
    Ok(ZoneResolution {
        tz,
        ambiguous: true,
    })
}
