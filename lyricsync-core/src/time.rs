//! Time and duration conversion utilities.
//!
//! Lyric offsets and track windows are plain millisecond integers, while the
//! tokio side of the engine speaks [`Duration`]. These helpers convert between
//! the two with explicit saturation instead of truncating casts.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Convert duration to milliseconds as i64, saturating at `i64::MAX`.
    ///
    /// Used when a duration is added to an epoch timestamp.
    fn as_millis_i64(&self) -> i64;

    /// Convert duration to seconds as u32, saturating at `u32::MAX`.
    fn as_secs_u32(&self) -> u32;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn as_millis_i64(&self) -> i64 {
        i64::try_from(self.as_millis()).unwrap_or(i64::MAX)
    }

    fn as_secs_u32(&self) -> u32 {
        u32::try_from(self.as_secs()).unwrap_or(u32::MAX)
    }
}

/// Convert a signed millisecond span to a [`Duration`], treating negative
/// spans as zero.
#[must_use]
pub fn millis_to_duration(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_millis_u64() {
        let duration = Duration::from_millis(1234);
        assert_eq!(duration.as_millis_u64(), 1234);
    }

    #[test]
    fn test_as_millis_i64() {
        let duration = Duration::from_millis(5000);
        assert_eq!(duration.as_millis_i64(), 5000);
    }

    #[test]
    fn test_as_secs_u32_truncates_sub_second() {
        let duration = Duration::from_millis(195_882);
        assert_eq!(duration.as_secs_u32(), 195);
    }

    #[test]
    fn test_as_secs_u32_large() {
        // Duration larger than u32::MAX seconds
        let duration = Duration::from_secs(u64::from(u32::MAX) + 1);
        assert_eq!(duration.as_secs_u32(), u32::MAX);
    }

    #[test]
    fn test_millis_to_duration_negative_is_zero() {
        assert_eq!(millis_to_duration(-250), Duration::ZERO);
        assert_eq!(millis_to_duration(250), Duration::from_millis(250));
    }
}
