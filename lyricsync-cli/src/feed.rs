//! Presence sources: JSON lines on stdin, or a simulated track.

use lyricsync_core::{
    millis_to_duration, parse_presence_update, Clock, CoreError, Presence, SyncEvent,
    SyncScheduler, SystemClock,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Forward presence updates read from `reader` until it reaches EOF.
///
/// Lines that fail to parse are logged and skipped.
///
/// # Errors
///
/// Returns [`CoreError::PresenceFeed`] if reading from the feed fails.
pub async fn watch<R>(reader: R, scheduler: &SyncScheduler) -> Result<(), CoreError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| CoreError::PresenceFeed {
                reason: e.to_string(),
            })?;

        let Some(line) = line else {
            info!("Presence feed closed");
            return Ok(());
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_presence_update(line) {
            Ok(Some(presence)) => {
                let remaining = presence.timestamps.end.saturating_sub(SystemClock.now_ms());
                debug!(
                    "Presence: {} (ends in {:?})",
                    presence.track_key(),
                    millis_to_duration(remaining)
                );
                scheduler.report_presence(Some(presence)).await;
            }
            Ok(None) => {
                debug!("Presence: nothing playing");
                scheduler.report_presence(None).await;
            }
            Err(e) => {
                warn!("Skipping malformed presence update: {}", e);
            }
        }
    }
}

/// A presence for `duration_ms` of playback starting at `now_ms`
#[must_use]
pub fn simulated_presence(
    artist: &str,
    song: &str,
    album: &str,
    duration_ms: u64,
    now_ms: i64,
) -> Presence {
    let duration = i64::try_from(duration_ms).unwrap_or(i64::MAX);
    Presence::new(now_ms, now_ms.saturating_add(duration), artist, song, album)
}

/// Report `presence` and wait until its window ends
pub async fn play(presence: Presence, scheduler: &SyncScheduler) {
    let mut rx = scheduler.subscribe();

    info!(
        "Simulating {} ({:?})",
        presence.track_key(),
        millis_to_duration(presence.timestamps.end.saturating_sub(presence.timestamps.start))
    );
    scheduler.report_presence(Some(presence)).await;

    loop {
        match rx.recv().await {
            Ok(SyncEvent::PlaybackEnded) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                debug!("Missed {} sync events", n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyricsync_core::{SessionState, SyncSettings};

    #[tokio::test]
    async fn test_watch_forwards_updates_and_skips_garbage() {
        let scheduler = SyncScheduler::new(SyncSettings::default());
        let mut rx = scheduler.subscribe();
        let now = SystemClock.now_ms();

        let input = format!(
            "not json\n\n{{\"timestamps\":{{\"start\":{},\"end\":{}}},\"song\":\"s\",\"artist\":\"a\"}}\n",
            now - 1_000,
            now + 60_000
        );
        watch(input.as_bytes(), &scheduler).await.unwrap();

        assert_eq!(scheduler.state().await, SessionState::AwaitingLyrics);
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::TrackStarted { .. }));

        watch("null\n".as_bytes(), &scheduler).await.unwrap();
        assert_eq!(scheduler.state().await, SessionState::Idle);

        scheduler.shutdown().await;
    }

    #[test]
    fn test_simulated_presence() {
        let presence = simulated_presence("a", "s", "", 196_000, 1_000);
        assert_eq!(presence.timestamps.start, 1_000);
        assert_eq!(presence.timestamps.end, 197_000);
        assert_eq!(presence.duration_ms(), 196_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_returns_when_track_ends() {
        let scheduler = SyncScheduler::new(SyncSettings::default());
        // Already past its end: the first tick ends it
        let now = SystemClock.now_ms();
        let presence = simulated_presence("a", "s", "", 1, now - 10);

        play(presence, &scheduler).await;
        assert_eq!(scheduler.state().await, SessionState::Ended);

        scheduler.shutdown().await;
    }
}
