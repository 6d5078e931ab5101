// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Reported instead of a duration when no run of the job is on record.
pub const JOB_NOT_RUNNING: &str = "<job not running>";

/// Reported when a start timestamp is unexpectedly missing.
pub const UNKNOWN: &str = "unknown";

/// Time passed since `start`. Clock steps backwards clamp to zero.
pub fn elapsed_since(start: OffsetDateTime) -> Duration {
    (OffsetDateTime::now_utc() - start).max(Duration::ZERO)
}

/// Formats with one decimal of seconds, e.g. `1.5s`. Never locale dependent.
pub fn format_duration(duration: Duration) -> String {
    // tenths of a second, rounded half up
    let tenths = (duration.whole_milliseconds().max(0) + 50) / 100;
    format!("{}.{}s", tenths / 10, tenths % 10)
}

pub fn format_elapsed_since(start: Option<OffsetDateTime>) -> String {
    match start {
        Some(start) => format_duration(elapsed_since(start)),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_timestamp(timestamp: Option<OffsetDateTime>) -> String {
    match timestamp {
        Some(timestamp) => timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| timestamp.to_string()),
        None => UNKNOWN.to_string(),
    }
}
