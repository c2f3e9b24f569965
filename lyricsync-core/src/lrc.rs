//! Lyric payload parsing.
//!
//! Two payload shapes are understood: line-tagged lyrics where each line
//! starts with a `[MM:SS.CC]` cue, and untimed plain text which is paced at a
//! fixed interval per line.

use serde::Serialize;
use std::sync::Arc;

/// Default pacing for untimed lyrics (3 seconds per line).
pub const DEFAULT_UNTIMED_LINE_DURATION_MS: u64 = 3000;

/// Byte length of a `[MM:SS.CC]` cue tag.
const TAG_LEN: usize = 10;

/// A single lyric line and the elapsed time at which it becomes active
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LyricLine {
    /// Milliseconds since track start
    pub time_offset_ms: u64,
    pub text: String,
}

impl LyricLine {
    pub fn new(time_offset_ms: u64, text: impl Into<String>) -> Self {
        Self {
            time_offset_ms,
            text: text.into(),
        }
    }
}

/// Immutable, time-ordered lyric lines for one track.
///
/// Cloning is cheap; the lines are shared. An empty sequence is a valid
/// "no lyrics available" value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricSequence {
    lines: Arc<[LyricLine]>,
}

impl LyricSequence {
    #[must_use]
    pub fn new(lines: Vec<LyricLine>) -> Self {
        Self {
            lines: Arc::from(lines),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    /// Lines around `index` for display: up to `before` lines ahead of it and
    /// `after` lines following it. With no active line the first `after + 1`
    /// lines are returned.
    #[must_use]
    pub fn visible_lines(&self, index: Option<usize>, before: usize, after: usize) -> &[LyricLine] {
        let Some(idx) = index else {
            let end = (after + 1).min(self.lines.len());
            return &self.lines[..end];
        };

        if idx >= self.lines.len() {
            return &[];
        }

        let start = idx.saturating_sub(before);
        let end = idx.saturating_add(after).saturating_add(1).min(self.lines.len());
        &self.lines[start..end]
    }

    /// Full lyric text, one line per cue
    #[must_use]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for LyricSequence {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<LyricLine>> for LyricSequence {
    fn from(lines: Vec<LyricLine>) -> Self {
        Self::new(lines)
    }
}

/// Parse line-tagged lyrics such as `[00:12.34] Hello world`.
///
/// Lines without a leading cue tag, and tagged lines with no text, are
/// dropped. Lines keep their input order; out-of-order input is not re-sorted.
#[must_use]
pub fn parse_timed(raw: &str) -> LyricSequence {
    let lines = raw
        .lines()
        .filter_map(|line| {
            let (time_offset_ms, rest) = parse_cue_tag(line.trim_start())?;
            let text = rest.trim();
            (!text.is_empty()).then(|| LyricLine::new(time_offset_ms, text))
        })
        .collect::<Vec<_>>();

    LyricSequence::new(lines)
}

/// Pace untimed lyrics at `line_duration_ms` per non-blank line.
///
/// The resulting cues are a display heuristic, not real timing.
#[must_use]
pub fn parse_untimed(raw: &str, line_duration_ms: u64) -> LyricSequence {
    let lines = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .zip(0_u64..)
        .map(|(text, i)| LyricLine::new(i.saturating_mul(line_duration_ms), text))
        .collect::<Vec<_>>();

    LyricSequence::new(lines)
}

/// Parse a leading `[MM:SS.CC]` tag, returning the offset in milliseconds and
/// the remainder of the line.
///
/// Every field is exactly two digits. Values are not range checked, so
/// `[00:75.00]` yields 75 seconds.
fn parse_cue_tag(line: &str) -> Option<(u64, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < TAG_LEN
        || bytes[0] != b'['
        || bytes[3] != b':'
        || bytes[6] != b'.'
        || bytes[9] != b']'
    {
        return None;
    }

    let minutes = two_digits(bytes[1], bytes[2])?;
    let seconds = two_digits(bytes[4], bytes[5])?;
    let centis = two_digits(bytes[7], bytes[8])?;

    let offset = minutes * 60_000 + seconds * 1000 + centis * 10;
    // The tag is pure ASCII, so TAG_LEN is a char boundary
    Some((offset, &line[TAG_LEN..]))
}

fn two_digits(tens: u8, ones: u8) -> Option<u64> {
    if tens.is_ascii_digit() && ones.is_ascii_digit() {
        Some(u64::from(tens - b'0') * 10 + u64::from(ones - b'0'))
    } else {
        None
    }
}
