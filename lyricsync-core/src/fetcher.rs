//! Lyrics fetcher that orchestrates multiple lyrics providers.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::lrc::parse_timed;
use crate::provider::{LyricsPayload, LyricsProvider, LyricsQuery};
use crate::scheduler::{FetchTicket, SyncEvent, SyncScheduler};

const LOG_TARGET: &str = "lyricsync::fetcher";

/// Lyrics fetcher that listens for lyric requests and resolves them
pub struct LyricsFetcher {
    scheduler: Arc<SyncScheduler>,
    providers: Vec<Box<dyn LyricsProvider>>,
    cancel_token: CancellationToken,
}

impl LyricsFetcher {
    /// Create a new lyrics fetcher
    ///
    /// # Arguments
    /// * `scheduler` - Scheduler to take lyric requests from and resolve them on
    /// * `providers` - List of lyrics providers to try in order
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    pub fn new(
        scheduler: Arc<SyncScheduler>,
        providers: Vec<Box<dyn LyricsProvider>>,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            scheduler,
            providers,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the lyrics fetcher in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the request loop. Each request gets its own task so a slow
    /// provider never holds up the fetch for the next track.
    async fn run(self: Arc<Self>) {
        info!(target: LOG_TARGET, "Initializing lyrics fetching handler");

        let mut rx = self.scheduler.subscribe();
        let mut last_spawned: Option<FetchTicket> = None;

        // A request may have been issued before we subscribed
        self.spawn_pending(&mut last_spawned).await;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: LOG_TARGET, "Lyrics fetcher shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Ok(SyncEvent::LyricsRequested { ticket, query }) => {
                            self.spawn_fetch(ticket, query, &mut last_spawned);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(target: LOG_TARGET, "Fetcher lagged by {} events", skipped);
                            self.spawn_pending(&mut last_spawned).await;
                        }
                        Err(RecvError::Closed) => break,
                        Ok(_) => {}
                    }
                }
            }
        }
    }

    async fn spawn_pending(self: &Arc<Self>, last_spawned: &mut Option<FetchTicket>) {
        if let Some((ticket, query)) = self.scheduler.pending_request().await {
            self.spawn_fetch(ticket, query, last_spawned);
        }
    }

    fn spawn_fetch(
        self: &Arc<Self>,
        ticket: FetchTicket,
        query: LyricsQuery,
        last_spawned: &mut Option<FetchTicket>,
    ) {
        if *last_spawned == Some(ticket) {
            return;
        }
        *last_spawned = Some(ticket);

        let fetcher = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = fetcher.cancel_token.cancelled() => return,
                outcome = fetcher.fetch_lyrics(&query) => outcome,
            };
            fetcher.scheduler.resolve_lyrics(ticket, outcome).await;
        });
    }

    /// Try each provider in order. The first timed result wins; plain text is
    /// kept as a fallback. Errors only surface when every provider failed.
    async fn fetch_lyrics(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
        let provider_names: Vec<_> = self.providers.iter().map(|p| p.name()).collect();
        info!(
            target: LOG_TARGET,
            "Fetching lyrics for: {} - {} (providers: {:?})",
            query.artist, query.song, provider_names
        );

        let mut fallback: Option<LyricsPayload> = None;
        let mut last_error: Option<CoreError> = None;
        let mut any_answered = false;

        for provider in &self.providers {
            debug!(target: LOG_TARGET, "Trying provider: {}", provider.name());
            match provider.fetch(query).await {
                Ok(LyricsPayload::Timed(raw)) => {
                    any_answered = true;
                    let lines = parse_timed(&raw).len();
                    if lines > 0 {
                        info!(
                            target: LOG_TARGET,
                            "Found synced lyrics from {} ({} lines)",
                            provider.name(),
                            lines
                        );
                        return Ok(LyricsPayload::Timed(raw));
                    }
                    debug!(
                        target: LOG_TARGET,
                        "Synced lyrics from {} had no usable lines",
                        provider.name()
                    );
                }
                Ok(LyricsPayload::Plain(raw)) => {
                    any_answered = true;
                    info!(target: LOG_TARGET, "Found unsynced lyrics from {}", provider.name());
                    if fallback.is_none() {
                        fallback = Some(LyricsPayload::Plain(raw));
                    }
                }
                Ok(LyricsPayload::NotFound) | Err(CoreError::LyricsNotFound { .. }) => {
                    any_answered = true;
                    info!(target: LOG_TARGET, "No lyrics found from {}", provider.name());
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, "Provider {} failed: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(plain) = fallback {
            return Ok(plain);
        }

        match last_error {
            Some(e) if !any_answered => Err(e),
            _ => {
                info!(
                    target: LOG_TARGET,
                    "No lyrics found for {} - {}",
                    query.artist, query.song
                );
                Ok(LyricsPayload::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::presence::Presence;
    use crate::scheduler::{LyricStatus, SyncSettings, EVENT_CHANNEL_CAPACITY};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000_000;

    /// Answers per song, optionally after a delay
    struct MockProvider {
        name: &'static str,
        answers: HashMap<&'static str, (Duration, Option<LyricsPayload>)>,
    }

    impl MockProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                answers: HashMap::new(),
            }
        }

        fn answer(mut self, song: &'static str, payload: LyricsPayload) -> Self {
            self.answers.insert(song, (Duration::ZERO, Some(payload)));
            self
        }

        fn answer_after(
            mut self,
            song: &'static str,
            delay: Duration,
            payload: LyricsPayload,
        ) -> Self {
            self.answers.insert(song, (delay, Some(payload)));
            self
        }

        fn fail(mut self, song: &'static str) -> Self {
            self.answers.insert(song, (Duration::ZERO, None));
            self
        }
    }

    #[async_trait]
    impl LyricsProvider for MockProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
            let Some((delay, answer)) = self.answers.get(query.song.as_str()) else {
                return Ok(LyricsPayload::NotFound);
            };
            tokio::time::sleep(*delay).await;
            answer.clone().ok_or_else(|| CoreError::LyricsProviderFailed {
                provider: self.name.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn fetcher_with(providers: Vec<Box<dyn LyricsProvider>>) -> LyricsFetcher {
        let scheduler = SyncScheduler::with_clock(
            SyncSettings::default(),
            Arc::new(ManualClock::starting_at(NOW)),
            None,
        );
        LyricsFetcher::new(scheduler, providers, None)
    }

    fn query(song: &str) -> LyricsQuery {
        LyricsQuery::new("artist", song, "", 180_000)
    }

    fn presence(song: &str, end_offset: i64) -> Option<Presence> {
        Some(Presence::new(NOW - 1_000, NOW + end_offset, "artist", song, ""))
    }

    #[tokio::test]
    async fn test_first_timed_result_wins() {
        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").answer("song", LyricsPayload::Plain("plain".into()))),
            Box::new(MockProvider::new("b").answer("song", LyricsPayload::Timed("[00:01.00]b".into()))),
            Box::new(MockProvider::new("c").answer("song", LyricsPayload::Timed("[00:01.00]c".into()))),
        ]);

        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::Timed("[00:01.00]b".into()));
    }

    #[tokio::test]
    async fn test_plain_is_fallback() {
        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").answer("song", LyricsPayload::Plain("first".into()))),
            Box::new(MockProvider::new("b").answer("song", LyricsPayload::Plain("second".into()))),
            Box::new(MockProvider::new("c").fail("song")),
        ]);

        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::Plain("first".into()));
    }

    #[tokio::test]
    async fn test_untagged_timed_text_is_skipped() {
        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").answer("song", LyricsPayload::Timed("no tags".into()))),
            Box::new(MockProvider::new("b").answer("song", LyricsPayload::Timed("[00:02.00]ok".into()))),
        ]);

        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::Timed("[00:02.00]ok".into()));
    }

    #[tokio::test]
    async fn test_error_only_when_all_failed() {
        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").fail("song")),
            Box::new(MockProvider::new("b").fail("song")),
        ]);
        let err = fetcher.fetch_lyrics(&query("song")).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::LyricsProviderFailed { ref provider, .. } if provider == "b"
        ));

        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").fail("song")),
            Box::new(MockProvider::new("b")),
        ]);
        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::NotFound);
    }

    struct NotFoundErrorProvider;

    #[async_trait]
    impl LyricsProvider for NotFoundErrorProvider {
        fn name(&self) -> &'static str {
            "not-found"
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
            Err(CoreError::LyricsNotFound {
                song: query.song.clone(),
                artist: query.artist.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_not_found_error_counts_as_answer() {
        let fetcher = fetcher_with(vec![
            Box::new(MockProvider::new("a").fail("song")),
            Box::new(NotFoundErrorProvider),
        ]);
        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::NotFound);
    }

    #[tokio::test]
    async fn test_no_providers_is_not_found() {
        let fetcher = fetcher_with(Vec::new());
        let payload = fetcher.fetch_lyrics(&query("song")).await.unwrap();
        assert_eq!(payload, LyricsPayload::NotFound);
    }

    async fn next_loaded(
        rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>,
    ) -> (LyricStatus, crate::lrc::LyricSequence) {
        loop {
            if let SyncEvent::LyricsLoaded { status, lyrics } = rx.recv().await.unwrap() {
                return (status, lyrics);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_requested_lyrics() {
        let fetcher = Arc::new(fetcher_with(vec![Box::new(
            MockProvider::new("a").answer("song", LyricsPayload::Timed("[00:00.50]hello".into())),
        )]));
        let scheduler = Arc::clone(&fetcher.scheduler);
        let mut rx = scheduler.subscribe();
        let handle = Arc::clone(&fetcher).start();

        scheduler.report_presence(presence("song", 60_000)).await;

        let (status, lyrics) = next_loaded(&mut rx).await;
        assert_eq!(status, LyricStatus::Ok);
        assert_eq!(lyrics.text(), "hello");

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_result_for_previous_track_is_discarded() {
        let fetcher = Arc::new(fetcher_with(vec![Box::new(
            MockProvider::new("a")
                .answer_after(
                    "first",
                    Duration::from_secs(5),
                    LyricsPayload::Timed("[00:00.10]stale".into()),
                )
                .answer("second", LyricsPayload::Timed("[00:00.10]fresh".into())),
        )]));
        let scheduler = Arc::clone(&fetcher.scheduler);
        let mut rx = scheduler.subscribe();
        let handle = Arc::clone(&fetcher).start();
        tokio::task::yield_now().await;

        scheduler.report_presence(presence("first", 60_000)).await;
        tokio::task::yield_now().await;
        scheduler.report_presence(presence("second", 90_000)).await;

        let (status, lyrics) = next_loaded(&mut rx).await;
        assert_eq!(status, LyricStatus::Ok);
        assert_eq!(lyrics.text(), "fresh");

        // Let the slow fetch for the first track finish
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(scheduler.lyrics().await.text(), "fresh");
        assert_eq!(scheduler.snapshot().await.lyric_status, Some(LyricStatus::Ok));

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_issued_before_start_is_picked_up() {
        let fetcher = Arc::new(fetcher_with(vec![Box::new(
            MockProvider::new("a").answer("early", LyricsPayload::Plain("one\ntwo".into())),
        )]));
        let scheduler = Arc::clone(&fetcher.scheduler);
        let mut rx = scheduler.subscribe();

        scheduler.report_presence(presence("early", 60_000)).await;
        let handle = Arc::clone(&fetcher).start();

        let (status, lyrics) = next_loaded(&mut rx).await;
        assert_eq!(status, LyricStatus::Ok);
        assert_eq!(lyrics.len(), 2);

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_lost_to_lag_is_recovered() {
        let fetcher = Arc::new(fetcher_with(vec![Box::new(
            MockProvider::new("a").answer("song", LyricsPayload::Timed("[00:00.50]hello".into())),
        )]));
        let scheduler = Arc::clone(&fetcher.scheduler);
        let handle = Arc::clone(&fetcher).start();

        // Fetcher is subscribed and idle
        tokio::task::yield_now().await;

        // Bury the request under more events than the channel holds. Restarts of
        // the same track keep the in-flight ticket.
        tokio::task::unconstrained(async {
            scheduler.report_presence(presence("song", 60_000)).await;
            let restarts = i64::try_from(EVENT_CHANNEL_CAPACITY).unwrap() + 8;
            for i in 1..=restarts {
                scheduler.report_presence(presence("song", 60_000 + i)).await;
            }
        })
        .await;
        assert!(scheduler.pending_request().await.is_some());

        let mut rx = scheduler.subscribe();
        let (status, lyrics) = tokio::time::timeout(Duration::from_secs(10), next_loaded(&mut rx))
            .await
            .unwrap();
        assert_eq!(status, LyricStatus::Ok);
        assert_eq!(lyrics.text(), "hello");
        assert!(scheduler.pending_request().await.is_none());

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_reports_error_status() {
        let fetcher = Arc::new(fetcher_with(vec![Box::new(MockProvider::new("a").fail("song"))]));
        let scheduler = Arc::clone(&fetcher.scheduler);
        let mut rx = scheduler.subscribe();
        let handle = Arc::clone(&fetcher).start();

        scheduler.report_presence(presence("song", 60_000)).await;

        let (status, lyrics) = next_loaded(&mut rx).await;
        assert_eq!(status, LyricStatus::Error);
        assert!(lyrics.is_empty());

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
        scheduler.shutdown().await;
    }
}
