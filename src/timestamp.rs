//! Conversions between the scale's clock and Unix time.
//!
//! BS410/BS444 scales count seconds from 2010-01-01, so raw timestamps
//! need [`EPOCH_OFFSET`] added before they are comparable to the host clock.
//! Some firmware already reports Unix time, which is why the offset is a
//! configuration switch rather than a constant conversion.

use chrono::DateTime;

/// Seconds from the Unix epoch to 2010-01-01T00:00:00Z.
pub const EPOCH_OFFSET: i64 = 1_262_304_000;

/// Largest timestamp the scale's signed 32-bit clock can represent.
pub const MAX_TIMESTAMP: i64 = i32::MAX as i64;

/// Turn a raw timestamp from a frame into absolute Unix seconds.
///
/// Values past [`MAX_TIMESTAMP`] are unusable and map to 0. When adding the
/// offset would overflow, the value is assumed to be absolute already and
/// is returned as is.
pub fn sanitize(raw: i64, use_offset: bool) -> i64 {
    if !use_offset {
        return raw;
    }
    if raw > MAX_TIMESTAMP {
        return 0;
    }
    match raw.checked_add(EPOCH_OFFSET) {
        Some(candidate) if candidate <= MAX_TIMESTAMP => candidate,
        _ => raw,
    }
}

/// Inverse of [`sanitize`]: the value the scale's clock should be set to.
///
/// Clamped to the `u32` range of the command frame.
pub fn device_clock(now: i64, use_offset: bool) -> u32 {
    let value = if use_offset { now - EPOCH_OFFSET } else { now };
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// `2024-05-01T07:30:00` style rendering used in log lines.
pub fn format(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => format!("@{timestamp}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_without_offset_is_identity() {
        assert_eq!(sanitize(0, false), 0);
        assert_eq!(sanitize(1234, false), 1234);
        assert_eq!(sanitize(MAX_TIMESTAMP + 10, false), MAX_TIMESTAMP + 10);
    }

    #[test]
    fn test_sanitize_applies_offset() {
        assert_eq!(sanitize(0, true), EPOCH_OFFSET);
        assert_eq!(sanitize(0x290F_4240, true), 0x290F_4240 + EPOCH_OFFSET);
    }

    #[test]
    fn test_sanitize_boundaries() {
        let last_offsettable = MAX_TIMESTAMP - EPOCH_OFFSET;
        assert_eq!(sanitize(last_offsettable, true), MAX_TIMESTAMP);
        assert_eq!(sanitize(last_offsettable + 1, true), last_offsettable + 1);
        assert_eq!(sanitize(MAX_TIMESTAMP, true), MAX_TIMESTAMP);
        assert_eq!(sanitize(MAX_TIMESTAMP + 1, true), 0);
        assert_eq!(sanitize(i64::from(u32::MAX), true), 0);
    }

    #[test]
    fn test_device_clock() {
        assert_eq!(device_clock(EPOCH_OFFSET + 42, true), 42);
        assert_eq!(device_clock(1_700_000_000, false), 1_700_000_000);
        // a host clock before 2010 cannot be expressed on the scale
        assert_eq!(device_clock(1000, true), 0);
    }

    #[test]
    fn test_format() {
        assert_eq!(format(EPOCH_OFFSET), "2010-01-01T00:00:00");
    }
}
