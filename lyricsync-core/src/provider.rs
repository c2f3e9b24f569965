use crate::error::CoreError;
use crate::lrc::{parse_timed, parse_untimed, LyricSequence};
use crate::presence::Presence;
use crate::time::DurationExt;
use async_trait::async_trait;
use std::time::Duration;

/// Query parameters for fetching lyrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    /// Artist name
    pub artist: String,
    /// Track name
    pub song: String,
    /// Album name (may be empty)
    pub album: String,
    /// Track duration in milliseconds (for matching)
    pub duration_ms: u64,
}

impl LyricsQuery {
    /// Create a new lyrics query
    pub fn new(
        artist: impl Into<String>,
        song: impl Into<String>,
        album: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            artist: artist.into(),
            song: song.into(),
            album: album.into(),
            duration_ms,
        }
    }

    /// Build a query for the track described by a presence update
    #[must_use]
    pub fn from_presence(presence: &Presence) -> Self {
        Self::new(
            &presence.artist,
            &presence.song,
            &presence.album,
            presence.duration_ms(),
        )
    }

    /// Duration in whole seconds, as lyric databases index it
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        Duration::from_millis(self.duration_ms).as_secs_u32()
    }
}

/// Raw lyrics as returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsPayload {
    /// Line-tagged lyrics (`[MM:SS.CC] text`)
    Timed(String),
    /// Plain text lyrics without timing
    Plain(String),
    /// No lyrics found
    NotFound,
}

impl LyricsPayload {
    /// Parse the payload into cues. Plain text is paced at
    /// `untimed_line_duration_ms` per line.
    #[must_use]
    pub fn to_sequence(&self, untimed_line_duration_ms: u64) -> LyricSequence {
        match self {
            Self::Timed(raw) => parse_timed(raw),
            Self::Plain(raw) => parse_untimed(raw, untimed_line_duration_ms),
            Self::NotFound => LyricSequence::empty(),
        }
    }
}

/// Trait for lyrics providers
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Fetch lyrics for a query
    async fn fetch(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError>;
}
