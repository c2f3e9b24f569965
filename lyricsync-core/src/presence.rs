//! Presence feed types.
//!
//! A presence update reports either "nothing playing" or the current track
//! with its absolute start/end timestamps. The field names follow the
//! Lanyard `spotify` activity object so feed payloads deserialize directly.

use crate::clock::TrackWindow;
use serde::{Deserialize, Serialize};

/// Absolute playback timestamps in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub start: i64,
    pub end: i64,
}

/// The track currently playing, as reported by the presence feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub timestamps: Timestamps,
    pub song: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
}

/// One presence report. `None` means no active playback.
pub type PresenceUpdate = Option<Presence>;

/// Identity of a track for lyric lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub artist: String,
    pub song: String,
    pub album: String,
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.song)
    }
}

impl Presence {
    pub fn new(
        start_absolute_ms: i64,
        end_absolute_ms: i64,
        artist: impl Into<String>,
        song: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            timestamps: Timestamps {
                start: start_absolute_ms,
                end: end_absolute_ms,
            },
            song: song.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    #[must_use]
    pub const fn window(&self) -> TrackWindow {
        TrackWindow::new(self.timestamps.start, self.timestamps.end)
    }

    #[must_use]
    pub fn track_key(&self) -> TrackKey {
        TrackKey {
            artist: self.artist.clone(),
            song: self.song.clone(),
            album: self.album.clone(),
        }
    }

    /// Track length derived from the window
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.window().duration_ms()
    }
}

/// Parse one presence update from JSON. `null` means nothing is playing.
///
/// # Errors
///
/// Returns an error if the payload is not `null` or a presence object.
pub fn parse_presence_update(json: &str) -> crate::error::Result<PresenceUpdate> {
    Ok(serde_json::from_str(json)?)
}
