//! Rendering of sync events for stdout.

use lyricsync_core::{LyricStatus, SyncEvent};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// One line of JSON output
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutputEvent<'a> {
    Track {
        artist: &'a str,
        song: &'a str,
        album: &'a str,
        duration_ms: u64,
    },
    Lyrics {
        status: LyricStatus,
        lines: usize,
    },
    Line {
        index: Option<usize>,
        time_ms: Option<u64>,
        text: Option<&'a str>,
    },
    Ended,
    Stopped,
}

fn to_output(event: &SyncEvent) -> Option<OutputEvent<'_>> {
    match event {
        SyncEvent::TrackStarted { track, window } => Some(OutputEvent::Track {
            artist: &track.artist,
            song: &track.song,
            album: &track.album,
            duration_ms: window.duration_ms(),
        }),
        SyncEvent::LyricsLoaded { status, lyrics } => Some(OutputEvent::Lyrics {
            status: *status,
            lines: lyrics.len(),
        }),
        SyncEvent::LyricChanged { index, line } => Some(OutputEvent::Line {
            index: *index,
            time_ms: line.as_ref().map(|l| l.time_offset_ms),
            text: line.as_ref().map(|l| l.text.as_str()),
        }),
        SyncEvent::PlaybackEnded => Some(OutputEvent::Ended),
        SyncEvent::PlaybackStopped => Some(OutputEvent::Stopped),
        SyncEvent::LyricsRequested { .. } | SyncEvent::Progress(_) => None,
    }
}

fn render_plain(event: &OutputEvent<'_>) -> Option<String> {
    match event {
        OutputEvent::Track { artist, song, .. } => Some(format!("\u{266a} {artist} - {song}")),
        OutputEvent::Lyrics { status, .. } => match status {
            LyricStatus::NotFound => Some("(no lyrics found)".to_string()),
            LyricStatus::Error => Some("(lyrics unavailable)".to_string()),
            LyricStatus::Ok | LyricStatus::Loading => None,
        },
        OutputEvent::Line { text, .. } => text.map(ToString::to_string),
        OutputEvent::Ended | OutputEvent::Stopped => None,
    }
}

/// Render one event in the given format. Events with nothing to show yield
/// `None`.
pub fn render(event: &SyncEvent, format: OutputFormat) -> Option<String> {
    let output = to_output(event)?;
    match format {
        OutputFormat::Plain => render_plain(&output),
        OutputFormat::Json => match serde_json::to_string(&output) {
            Ok(line) => Some(line),
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                None
            }
        },
    }
}

/// Print events until cancelled or the channel closes. Queued events are
/// printed before cancellation is observed.
pub async fn print_events(
    mut rx: broadcast::Receiver<SyncEvent>,
    format: OutputFormat,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(line) = render(&event, format) {
                            println!("{line}");
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Sync event channel closed");
                        break;
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("Missed {} sync events", n);
                    }
                }
            }
            () = cancel_token.cancelled() => break,
        }
    }
}
