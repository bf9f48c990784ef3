//! Timestamps are stored as UTC `timestamp` columns (`PrimitiveDateTime`).

use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub fn utc_now() -> PrimitiveDateTime {
    to_primitive_utc(OffsetDateTime::now_utc())
}

pub fn to_primitive_utc(at: OffsetDateTime) -> PrimitiveDateTime {
    let utc = at.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub fn unix_seconds(at: PrimitiveDateTime) -> i64 {
    at.assume_utc().unix_timestamp()
}

/// Midnight of the local day containing `now` at `offset`, as UTC.
pub fn start_of_local_day(now: OffsetDateTime, offset: UtcOffset) -> PrimitiveDateTime {
    let local_midnight = now.to_offset(offset).replace_time(Time::MIDNIGHT);
    to_primitive_utc(local_midnight)
}
