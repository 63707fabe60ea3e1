//! Timezone offset lookup backed by the IANA database via `chrono_tz`,
//! DST-aware at the instant of the login being evaluated. Older
//! geolocation providers report bare abbreviations instead of zone names;
//! a small fallback table covers the common ones.

use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// UTC offset in hours for a timezone name at the given instant
/// (epoch milliseconds). Returns `None` for names neither the IANA
/// database nor the abbreviation fallback recognizes.
pub fn offset_hours(name: &str, at_ms: i64) -> Option<f64> {
    if let Ok(tz) = name.parse::<Tz>() {
        let at: DateTime<Utc> = Utc.timestamp_millis_opt(at_ms).single()?;
        let offset = tz.offset_from_utc_datetime(&at.naive_utc());
        return Some(offset.fix().local_minus_utc() as f64 / 3600.0);
    }
    abbreviation_offset(name)
}

/// Fixed offsets for abbreviations that are not IANA zone names.
/// DST is unknowable for these; the standard-time offset is used.
fn abbreviation_offset(name: &str) -> Option<f64> {
    let offset = match name.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" => 0.0,
        "EST" => -5.0,
        "EDT" => -4.0,
        "CST" => -6.0,
        "CDT" => -5.0,
        "MST" => -7.0,
        "PST" => -8.0,
        "PDT" => -7.0,
        "CET" => 1.0,
        "CEST" => 2.0,
        "JST" => 9.0,
        "IST" => 5.5,
        _ => return None,
    };
    Some(offset)
}

/// Absolute offset difference in hours between two zones at an instant,
/// treating unknown zones as UTC (the pre-IANA behavior this replaced).
pub fn offset_difference_hours(tz1: &str, tz2: &str, at_ms: i64) -> f64 {
    let o1 = offset_hours(tz1, at_ms).unwrap_or_else(|| {
        log::debug!("unknown timezone '{}', assuming UTC", tz1);
        0.0
    });
    let o2 = offset_hours(tz2, at_ms).unwrap_or_else(|| {
        log::debug!("unknown timezone '{}', assuming UTC", tz2);
        0.0
    });
    (o1 - o2).abs()
}
