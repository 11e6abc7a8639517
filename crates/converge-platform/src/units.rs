//! Unit and date conversions between declared and wire values

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

const DATE_FORMAT: &str = "%d/%m/%Y";
const MIB_PER_GIB: f64 = 1024.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn mebibytes_to_gibibytes(mib: f64) -> f64 {
    mib / MIB_PER_GIB
}

pub fn gibibytes_to_mebibytes(gib: f64) -> f64 {
    gib * MIB_PER_GIB
}

pub fn bytes_to_gibibytes(bytes: f64) -> f64 {
    bytes / BYTES_PER_GIB
}

pub fn gibibytes_to_bytes(gib: f64) -> f64 {
    gib * BYTES_PER_GIB
}

/// Check a declared `dd/mm/yyyy` date
pub fn parse_date(date: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| format!("expected dd/mm/yyyy, got {:?}: {}", date, e))
}

/// `dd/mm/yyyy` to an RFC 3339 timestamp at midnight UTC
pub fn date_to_rfc3339(date: &str) -> Result<String, String> {
    let day = parse_date(date)?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date {:?}", date))?
        .and_utc();
    Ok(midnight.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// RFC 3339 timestamp to `dd/mm/yyyy`; `None` for a missing or unparsable
/// timestamp
pub fn rfc3339_to_date(timestamp: Option<&str>) -> Option<String> {
    let timestamp = timestamp.filter(|t| !t.is_empty())?;
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|t| t.with_timezone(&Utc).format(DATE_FORMAT).to_string())
}
