//! Packs a span id into the unused sub-microsecond digits of a timestamp.
//!
//! Span start times have microsecond resolution while InfluxDB stores
//! nanoseconds. Two spans of one trace starting in the same microsecond would
//! otherwise land on the same series point and overwrite each other, so the
//! three spare digits carry `span_id % 997`. Collisions are still possible for
//! span ids congruent modulo 997; data already written depends on this exact
//! scheme.
//!
//! The microsecond is found with a floored remainder, so start times before
//! 1970 round-trip too. For later times this is the same as truncation.

use chrono::{DateTime, Utc};

use crate::model::SpanId;

/// Modulus applied to the span id before it is added to the timestamp.
pub const SPAN_ID_MODULUS: u64 = 997;

const NANOS_PER_MICRO: i64 = 1_000;

/// Stored point timestamp for a span starting at `start`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn merge(start: DateTime<Utc>, span_id: SpanId) -> i64 {
    let nanos = unix_nanos(start);
    // always < 997, fits in i64
    let suffix = (span_id.0 % SPAN_ID_MODULUS) as i64;
    nanos - nanos.rem_euclid(NANOS_PER_MICRO) + suffix
}

/// Span start time recovered from a stored point timestamp.
#[must_use]
pub fn split(stored: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(stored - stored.rem_euclid(NANOS_PER_MICRO))
}

/// Nanoseconds since the Unix epoch, saturating outside the representable range.
#[must_use]
pub fn unix_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
