// Date lexeme grammars and time-zone handling
// Two accepted shapes: ISO 8601 and the US month/day/year form.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;

/// Time-zone resolution errors.
#[derive(Error, Debug)]
#[error("unknown time zone \"{0}\"")]
pub struct ZoneError(pub String);

/// The default zone: GMT/UTC.
pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

/// Resolve an IANA zone name (e.g. "Pacific/Honolulu") to its UTC offset at
/// the current instant.
pub fn resolve_zone(name: &str) -> Result<FixedOffset, ZoneError> {
    let tz: Tz = name.parse().map_err(|_| ZoneError(name.to_string()))?;
    Ok(tz.offset_from_utc_datetime(&Utc::now().naive_utc()).fix())
}

/// ISO 8601: `YYYY-MM-DD[THH:MM[:SS[.fff]]]` with an optional `Z`, `±HH:MM`,
/// or ` GMT±HH:MM` suffix.
fn iso_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(\d{4})-(\d{2})-(\d{2})(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?)?(?:(Z)|([+-]\d{2}:\d{2})|\s+GMT([+-]\d{2}:\d{2}))?$",
        )
        .unwrap()
    })
}

/// US variant: `M[M]/D[D]/YYYY[ H[H]:MM[:SS[.fff]] AM|PM][ GMT±HH:MM|Z]`.
fn us_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?\s*(AM|PM))?(?:\s+GMT([+-]\d{2}:\d{2})|\s*(Z))?$",
        )
        .unwrap()
    })
}

/// Try both date grammars against a naked lexeme. A lexeme with no embedded
/// offset is reinterpreted in `default_offset`; an invalid calendar date
/// (e.g. month 13) is simply not a date.
pub fn parse_date(raw: &str, default_offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Some(caps) = iso_regex().captures(raw) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        let naive = with_time(
            date,
            caps.get(4).map(|m| m.as_str()),
            caps.get(5).map(|m| m.as_str()),
            caps.get(6).map(|m| m.as_str()),
            caps.get(7).map(|m| m.as_str()),
            0,
        )?;
        let offset = embedded_offset(
            caps.get(8).is_some(),
            caps.get(9).or_else(|| caps.get(10)).map(|m| m.as_str()),
            default_offset,
        )?;
        return offset.from_local_datetime(&naive).single();
    }

    if let Some(caps) = us_regex().captures(raw) {
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
        )?;
        let hour_shift = match caps.get(8).map(|m| m.as_str().to_ascii_uppercase()) {
            Some(ref meridiem) => {
                let hour: u32 = caps.get(4)?.as_str().parse().ok()?;
                if !(1..=12).contains(&hour) {
                    return None;
                }
                match (meridiem.as_str(), hour) {
                    ("AM", 12) => -12i32,
                    ("PM", h) if h != 12 => 12,
                    _ => 0,
                }
            }
            None => 0,
        };
        let naive = with_time(
            date,
            caps.get(4).map(|m| m.as_str()),
            caps.get(5).map(|m| m.as_str()),
            caps.get(6).map(|m| m.as_str()),
            caps.get(7).map(|m| m.as_str()),
            hour_shift,
        )?;
        let offset = embedded_offset(
            caps.get(10).is_some(),
            caps.get(9).map(|m| m.as_str()),
            default_offset,
        )?;
        return offset.from_local_datetime(&naive).single();
    }

    None
}

fn with_time(
    date: NaiveDate,
    hour: Option<&str>,
    minute: Option<&str>,
    second: Option<&str>,
    millis: Option<&str>,
    hour_shift: i32,
) -> Option<NaiveDateTime> {
    let hour: u32 = hour.map_or(Some(0), |h| h.parse().ok())?;
    let hour = hour as i32 + hour_shift;
    if !(0..24).contains(&hour) {
        return None;
    }
    let hour = hour as u32;
    let minute = minute.map_or(Some(0), |m| m.parse().ok())?;
    let second = second.map_or(Some(0), |s| s.parse().ok())?;
    // ".5" means 500ms: pad the fraction out to milliseconds
    let millis = millis.map_or(Some(0), |f| format!("{:0<3}", f).parse().ok())?;
    date.and_hms_milli_opt(hour, minute, second, millis)
}

fn embedded_offset(
    zulu: bool,
    hhmm: Option<&str>,
    default_offset: FixedOffset,
) -> Option<FixedOffset> {
    if zulu {
        return Some(utc());
    }
    match hhmm {
        Some(s) => parse_offset(s),
        None => Some(default_offset),
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let sign = if s.starts_with('-') { -1 } else { 1 };
    let hours: i32 = s[1..3].parse().ok()?;
    let minutes: i32 = s[4..6].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
