//! Playback clock: maps wall-clock time onto a track's elapsed time and
//! progress.

use chrono::Utc;

/// Source of the current wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Absolute start and end of one playback session of one track.
///
/// A window is identified by its end timestamp: a report with a different
/// end means a new track (or the same track restarted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackWindow {
    pub start_absolute_ms: i64,
    pub end_absolute_ms: i64,
}

impl TrackWindow {
    #[must_use]
    pub const fn new(start_absolute_ms: i64, end_absolute_ms: i64) -> Self {
        Self {
            start_absolute_ms,
            end_absolute_ms,
        }
    }

    /// Whether `end > start`. Inverted windows are still usable; they
    /// behave as zero-length tracks.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.end_absolute_ms > self.start_absolute_ms
    }

    /// Track length in milliseconds, zero for inverted windows
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.end_absolute_ms.saturating_sub(self.start_absolute_ms)).unwrap_or(0)
    }

    /// Milliseconds since the track started, clamped to `[0, duration]`
    #[must_use]
    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        let raw = u64::try_from(now_ms.saturating_sub(self.start_absolute_ms)).unwrap_or(0);
        raw.min(self.duration_ms())
    }

    /// Elapsed time as a fraction of the track length, in `[0, 1]`.
    ///
    /// Zero-length and inverted windows report 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_fraction(&self, now_ms: i64) -> f64 {
        let duration = self.duration_ms();
        if duration == 0 {
            return 0.0;
        }
        if now_ms >= self.end_absolute_ms {
            return 1.0;
        }

        (self.elapsed_ms(now_ms) as f64 / duration as f64).clamp(0.0, 1.0)
    }

    /// Whether playback has reached the end of the window
    #[must_use]
    pub const fn has_ended(&self, now_ms: i64) -> bool {
        now_ms >= self.end_absolute_ms
    }
}
