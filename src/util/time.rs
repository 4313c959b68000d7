//! Timestamp handling for the watchers.
//!
//! Records are bounded in time by microsecond timestamps that come either
//! from the log lines themselves or from the wall clock at ingestion.

use chrono::{NaiveDateTime, TimeZone, Utc};

/// Where a record's timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Parse the timestamp embedded in each log line (replay-safe).
    #[default]
    LogEmbedded,
    /// Stamp each line with the wall clock at ingestion.
    Ingestion,
}

/// Current wall-clock time in microseconds since the Unix epoch (UTC).
pub fn now_usecs() -> i64 {
    Utc::now().timestamp_micros()
}

/// Parse the date and time tokens of a servlet log line into microseconds.
///
/// The log carries `08/05/13 19:34:35.622 CEST +0200`; only the first two
/// tokens are parsed and the value is taken as UTC. The zone name and offset
/// tokens are ignored, which matches how the upstream log is consumed
/// elsewhere in the toolchain.
///
/// Returns `None` for malformed tokens; callers fall back to ingestion time
/// so that one bad line never stops the stream.
pub fn parse_log_timestamp_usecs(date: &str, time: &str) -> Option<i64> {
    let joined = format!("{date} {time}");
    let parsed = NaiveDateTime::parse_from_str(&joined, "%m/%d/%y %H:%M:%S%.3f").ok()?;
    Some(Utc.from_utc_datetime(&parsed).timestamp_micros())
}
