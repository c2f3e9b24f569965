//! Track session state machine and the periodic tick that drives it.
//!
//! [`SyncSession`] holds the per-session state and reacts to discrete inputs
//! (presence reports, resolved lyrics, ticks, teardown) through a single
//! [`SyncSession::handle`] entry point. [`SyncScheduler`] wraps a session
//! with a tokio ticker and broadcasts the resulting [`SyncEvent`]s.

use crate::clock::{Clock, SystemClock, TrackWindow};
use crate::cursor::CursorState;
use crate::error::CoreError;
use crate::lrc::{LyricLine, LyricSequence, DEFAULT_UNTIMED_LINE_DURATION_MS};
use crate::presence::{Presence, PresenceUpdate, TrackKey};
use crate::provider::{LyricsPayload, LyricsQuery};
use crate::time::DurationExt;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::scheduler";

/// Default tick cadence
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of one track session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No active track
    Idle,
    /// Track window known, lyrics not yet resolved
    AwaitingLyrics,
    /// Window and lyrics known, ticking
    Running,
    /// Playback reached the end of the window
    Ended,
}

impl SessionState {
    /// Whether the session should be ticking
    #[must_use]
    pub const fn is_ticking(self) -> bool {
        matches!(self, Self::AwaitingLyrics | Self::Running)
    }
}

/// Lyric availability reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricStatus {
    Loading,
    Ok,
    NotFound,
    Error,
}

/// Identifies one lyric fetch. Results carrying a ticket that is no longer
/// pending are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

/// Read-only view of the session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub state: SessionState,
    pub elapsed_ms: u64,
    pub duration_ms: u64,
    /// Elapsed time normalized to `[0, 1]`
    pub progress: f64,
    pub active_index: Option<usize>,
    /// `None` while idle
    pub lyric_status: Option<LyricStatus>,
}

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A new track window started (new track, or the same track restarted)
    TrackStarted { track: TrackKey, window: TrackWindow },
    /// Lyrics are needed for the current track
    LyricsRequested {
        ticket: FetchTicket,
        query: LyricsQuery,
    },
    /// Lyrics for the current track were resolved
    LyricsLoaded {
        status: LyricStatus,
        lyrics: LyricSequence,
    },
    /// The active lyric line changed
    LyricChanged {
        index: Option<usize>,
        line: Option<LyricLine>,
    },
    /// Per-tick elapsed/progress update
    Progress(SyncSnapshot),
    /// Playback reached the end of the current window
    PlaybackEnded,
    /// No active playback
    PlaybackStopped,
}

/// Inputs dispatched into [`SyncSession::handle`]
#[derive(Debug)]
pub enum SessionInput {
    Presence(PresenceUpdate),
    LyricsResolved {
        ticket: FetchTicket,
        outcome: Result<LyricsPayload, CoreError>,
    },
    Tick,
    Teardown,
}

/// Tunables for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub tick_interval: Duration,
    /// Added to elapsed time before looking up the active line
    pub timing_offset_ms: i64,
    /// Pacing for plain-text lyrics
    pub untimed_line_duration_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            timing_offset_ms: 0,
            untimed_line_duration_ms: DEFAULT_UNTIMED_LINE_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingFetch {
    ticket: FetchTicket,
    query: LyricsQuery,
}

/// State of one host session: the current window, its lyrics and the cursor.
#[derive(Debug)]
pub struct SyncSession {
    settings: SyncSettings,
    state: SessionState,
    window: Option<TrackWindow>,
    /// End timestamp of the last reported window, for change detection
    last_seen_end: Option<i64>,
    track: Option<TrackKey>,
    sequence: LyricSequence,
    status: Option<LyricStatus>,
    cursor: CursorState,
    pending: Option<PendingFetch>,
    /// Bumped whenever the window is replaced or cleared
    generation: u64,
    next_ticket: u64,
}

impl SyncSession {
    #[must_use]
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            state: SessionState::Idle,
            window: None,
            last_seen_end: None,
            track: None,
            sequence: LyricSequence::empty(),
            status: None,
            cursor: CursorState::default(),
            pending: None,
            generation: 0,
            next_ticket: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn window(&self) -> Option<TrackWindow> {
        self.window
    }

    #[must_use]
    pub const fn lyrics(&self) -> &LyricSequence {
        &self.sequence
    }

    #[must_use]
    pub const fn lyric_status(&self) -> Option<LyricStatus> {
        self.status
    }

    #[must_use]
    pub const fn active_index(&self) -> Option<usize> {
        self.cursor.active_index()
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The outstanding lyric fetch, if any
    #[must_use]
    pub fn pending_request(&self) -> Option<(FetchTicket, LyricsQuery)> {
        self.pending
            .as_ref()
            .map(|p| (p.ticket, p.query.clone()))
    }

    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> SyncSnapshot {
        let (elapsed_ms, duration_ms, progress) = self.window.map_or((0, 0, 0.0), |w| {
            (w.elapsed_ms(now_ms), w.duration_ms(), w.progress_fraction(now_ms))
        });

        SyncSnapshot {
            state: self.state,
            elapsed_ms,
            duration_ms,
            progress,
            active_index: self.cursor.active_index(),
            lyric_status: self.status,
        }
    }

    /// Apply one input and return the events it produced.
    pub fn handle(&mut self, input: SessionInput, now_ms: i64) -> Vec<SyncEvent> {
        match input {
            SessionInput::Presence(Some(presence)) => self.on_window(&presence),
            SessionInput::Presence(None) | SessionInput::Teardown => self.on_stopped(),
            SessionInput::LyricsResolved { ticket, outcome } => {
                self.on_lyrics_resolved(ticket, outcome)
            }
            SessionInput::Tick => self.on_tick(now_ms),
        }
    }

    fn on_window(&mut self, presence: &Presence) -> Vec<SyncEvent> {
        let window = presence.window();
        if self.last_seen_end == Some(window.end_absolute_ms) {
            return Vec::new();
        }

        if !window.is_valid() {
            warn!(
                target: LOG_TARGET,
                "Track window ends before it starts ({} >= {}), treating as zero length",
                window.start_absolute_ms, window.end_absolute_ms
            );
        }

        let key = presence.track_key();
        let same_track = self.track.as_ref() == Some(&key);
        info!(
            target: LOG_TARGET,
            "New track window for {} ({}ms)",
            key,
            window.duration_ms()
        );

        self.last_seen_end = Some(window.end_absolute_ms);
        self.window = Some(window);
        self.generation += 1;
        let previous_index = self.cursor.active_index();
        self.cursor.reset();
        self.state = SessionState::AwaitingLyrics;

        let mut events = vec![SyncEvent::TrackStarted {
            track: key.clone(),
            window,
        }];

        // Hosts following line changes must drop the previous track's line
        if previous_index.is_some() {
            events.push(SyncEvent::LyricChanged {
                index: None,
                line: None,
            });
        }

        match self.status {
            Some(status @ (LyricStatus::Ok | LyricStatus::NotFound)) if same_track => {
                debug!(target: LOG_TARGET, "Reusing resolved lyrics for restarted track {}", key);
                self.state = SessionState::Running;
                events.push(SyncEvent::LyricsLoaded {
                    status,
                    lyrics: self.sequence.clone(),
                });
            }
            Some(LyricStatus::Loading) if same_track && self.pending.is_some() => {
                debug!(target: LOG_TARGET, "Lyrics fetch for {} already in flight", key);
            }
            _ => {
                let ticket = FetchTicket(self.next_ticket);
                self.next_ticket += 1;
                let query = LyricsQuery::from_presence(presence);

                self.sequence = LyricSequence::empty();
                self.status = Some(LyricStatus::Loading);
                self.pending = Some(PendingFetch {
                    ticket,
                    query: query.clone(),
                });
                events.push(SyncEvent::LyricsRequested { ticket, query });
            }
        }

        self.track = Some(key);
        events
    }

    fn on_stopped(&mut self) -> Vec<SyncEvent> {
        if self.state == SessionState::Idle && self.window.is_none() {
            return Vec::new();
        }

        info!(target: LOG_TARGET, "Playback stopped");
        self.state = SessionState::Idle;
        self.window = None;
        self.last_seen_end = None;
        self.track = None;
        self.sequence = LyricSequence::empty();
        self.status = None;
        self.cursor.reset();
        self.pending = None;
        self.generation += 1;

        vec![SyncEvent::PlaybackStopped]
    }

    fn on_lyrics_resolved(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<LyricsPayload, CoreError>,
    ) -> Vec<SyncEvent> {
        if self.pending.as_ref().map(|p| p.ticket) != Some(ticket) {
            debug!(target: LOG_TARGET, "Discarding superseded lyrics result {:?}", ticket);
            return Vec::new();
        }
        self.pending = None;

        let (sequence, status) = match outcome {
            Ok(payload) => {
                let sequence = payload.to_sequence(self.settings.untimed_line_duration_ms);
                let status = if sequence.is_empty() {
                    LyricStatus::NotFound
                } else {
                    LyricStatus::Ok
                };
                (sequence, status)
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Lyrics fetch failed: {}", e);
                (LyricSequence::empty(), LyricStatus::Error)
            }
        };

        info!(
            target: LOG_TARGET,
            "Lyrics resolved: {:?} ({} lines)",
            status,
            sequence.len()
        );

        self.sequence = sequence.clone();
        self.status = Some(status);
        if self.state == SessionState::AwaitingLyrics {
            self.state = SessionState::Running;
        }

        vec![SyncEvent::LyricsLoaded {
            status,
            lyrics: sequence,
        }]
    }

    fn on_tick(&mut self, now_ms: i64) -> Vec<SyncEvent> {
        if !self.state.is_ticking() {
            return Vec::new();
        }
        let Some(window) = self.window else {
            return Vec::new();
        };

        if window.has_ended(now_ms) {
            info!(target: LOG_TARGET, "Track window ended");
            self.state = SessionState::Ended;
            return vec![
                SyncEvent::Progress(self.snapshot(now_ms)),
                SyncEvent::PlaybackEnded,
            ];
        }

        let mut events = Vec::with_capacity(2);

        if self.state == SessionState::Running {
            let elapsed = i64::try_from(window.elapsed_ms(now_ms)).unwrap_or(i64::MAX);
            let lookup = elapsed.saturating_add(self.settings.timing_offset_ms);

            if self.cursor.update(&self.sequence, lookup) {
                let index = self.cursor.active_index();
                events.push(SyncEvent::LyricChanged {
                    index,
                    line: index.and_then(|i| self.sequence.get(i)).cloned(),
                });
            }
        }

        events.push(SyncEvent::Progress(self.snapshot(now_ms)));
        events
    }
}

struct SchedulerInner {
    session: SyncSession,
    /// Cancels the ticker of the current window
    ticker: Option<CancellationToken>,
}

/// Drives a [`SyncSession`] on a fixed cadence and broadcasts its events.
///
/// Ticks for one scheduler never overlap: a slow tick delays the next one.
/// A new window or a stop cancels the running ticker before anything else is
/// applied, and a tick that was already queued for the old window finds the
/// generation changed and exits.
pub struct SyncScheduler {
    inner: RwLock<SchedulerInner>,
    event_tx: broadcast::Sender<SyncEvent>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    cancel_token: CancellationToken,
    this: Weak<Self>,
}

impl SyncScheduler {
    /// Create a scheduler on the system clock
    #[must_use]
    pub fn new(settings: SyncSettings) -> Arc<Self> {
        Self::with_clock(settings, Arc::new(SystemClock), None)
    }

    /// Create a scheduler with an explicit clock.
    ///
    /// # Arguments
    /// * `settings` - Tick cadence and lyric timing tunables
    /// * `clock` - Wall-clock source used for elapsed time
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn with_clock(
        settings: SyncSettings,
        clock: Arc<dyn Clock>,
        cancel_token: Option<CancellationToken>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Arc::new_cyclic(|this| Self {
            inner: RwLock::new(SchedulerInner {
                session: SyncSession::new(settings),
                ticker: None,
            }),
            event_tx,
            clock,
            tick_interval: settings.tick_interval,
            cancel_token: cancel_token.unwrap_or_default(),
            this: this.clone(),
        })
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Report the latest presence. Re-reporting the current window is a no-op.
    pub async fn report_presence(&self, update: PresenceUpdate) {
        let mut inner = self.inner.write().await;
        self.apply(&mut inner, SessionInput::Presence(update));
    }

    /// Hand back the outcome of a lyric fetch. Results for a superseded
    /// ticket are dropped.
    pub async fn resolve_lyrics(
        &self,
        ticket: FetchTicket,
        outcome: Result<LyricsPayload, CoreError>,
    ) {
        let mut inner = self.inner.write().await;
        self.apply(&mut inner, SessionInput::LyricsResolved { ticket, outcome });
    }

    /// Stop ticking and clear the session
    pub async fn shutdown(&self) {
        let mut inner = self.inner.write().await;
        self.apply(&mut inner, SessionInput::Teardown);
        self.cancel_token.cancel();
    }

    /// Current snapshot, computed against the clock
    pub async fn snapshot(&self) -> SyncSnapshot {
        self.inner.read().await.session.snapshot(self.clock.now_ms())
    }

    /// Lyrics of the current track
    pub async fn lyrics(&self) -> LyricSequence {
        self.inner.read().await.session.lyrics().clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.session.state()
    }

    /// The outstanding lyric fetch, if any
    pub async fn pending_request(&self) -> Option<(FetchTicket, LyricsQuery)> {
        self.inner.read().await.session.pending_request()
    }

    /// Whether a ticker is currently armed
    pub async fn is_ticking(&self) -> bool {
        self.inner.read().await.ticker.is_some()
    }

    fn apply(&self, inner: &mut SchedulerInner, input: SessionInput) {
        let generation = inner.session.generation();
        let events = inner.session.handle(input, self.clock.now_ms());

        let superseded = inner.session.generation() != generation;
        if superseded || !inner.session.state().is_ticking() {
            if let Some(ticker) = inner.ticker.take() {
                ticker.cancel();
            }
        }
        if superseded && inner.session.state().is_ticking() && !self.cancel_token.is_cancelled() {
            inner.ticker = Some(self.spawn_ticker(inner.session.generation()));
        }

        for event in events {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }

    fn spawn_ticker(&self, generation: u64) -> CancellationToken {
        let token = self.cancel_token.child_token();
        let ticker_token = token.clone();
        let scheduler = self.this.clone();
        let period = self.tick_interval;

        debug!(
            target: LOG_TARGET,
            "Arming ticker for session {} every {}ms",
            generation,
            period.as_millis_u64()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = ticker_token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(scheduler) = scheduler.upgrade() else {
                            break;
                        };
                        if !scheduler.tick(generation).await {
                            break;
                        }
                    }
                }
            }

            debug!(target: LOG_TARGET, "Ticker for session {} stopped", generation);
        });

        token
    }

    /// Run one tick for `generation`; returns whether ticking should go on.
    async fn tick(&self, generation: u64) -> bool {
        let mut inner = self.inner.write().await;
        if inner.session.generation() != generation {
            return false;
        }

        self.apply(&mut inner, SessionInput::Tick);
        inner.session.state().is_ticking()
    }
}
