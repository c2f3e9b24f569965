//! Resolves which lyric line is active for a given elapsed time.

use crate::lrc::{LyricLine, LyricSequence};

/// Index of the active line at `elapsed_ms`, or `None` before the first cue
/// (or when there are no lines).
///
/// The active line is the last one whose cue has passed; the final line stays
/// active indefinitely once reached. Lines sharing a cue time collapse onto
/// the earliest of them. Negative elapsed times are treated as zero.
///
/// `lines` must be sorted by `time_offset_ms`; for unsorted input the result
/// is unspecified.
#[must_use]
pub fn locate(lines: &[LyricLine], elapsed_ms: i64) -> Option<usize> {
    let elapsed = u64::try_from(elapsed_ms).unwrap_or(0);

    let passed = lines.partition_point(|line| line.time_offset_ms <= elapsed);
    let last = passed.checked_sub(1)?;

    let cue = lines[last].time_offset_ms;
    Some(lines[..last].partition_point(|line| line.time_offset_ms < cue))
}

/// Active-line tracking for one track session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorState {
    active_index: Option<usize>,
}

impl CursorState {
    #[must_use]
    pub const fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    /// Recompute the active line, returning `true` when it changed.
    pub fn update(&mut self, sequence: &LyricSequence, elapsed_ms: i64) -> bool {
        let index = locate(sequence.lines(), elapsed_ms);
        let changed = index != self.active_index;
        self.active_index = index;
        changed
    }

    /// Back to "no active line"
    pub fn reset(&mut self) {
        self.active_index = None;
    }
}
