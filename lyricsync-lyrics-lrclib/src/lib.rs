use async_trait::async_trait;
use lyricsync_core::{CoreError, LyricsPayload, LyricsProvider, LyricsQuery};
use serde::Deserialize;
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::provider::lrclib";
const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Calculate a score for duration matching (lower is better).
/// Returns 0 for exact matches, higher values for larger differences.
/// Capped at `i32::MAX` to prevent overflow.
#[allow(clippy::cast_possible_truncation)]
fn duration_score(actual: Option<f64>, expected_secs: u32) -> i32 {
    match actual {
        Some(d) => {
            let diff = (d - f64::from(expected_secs)).abs() * 10.0;
            if diff > f64::from(i32::MAX) {
                i32::MAX
            } else {
                diff as i32
            }
        }
        None => 50, // Default score when duration is unknown
    }
}

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout_secs: u64) -> Result<Self, CoreError> {
        Self::with_base_url(LRCLIB_API_URL, timeout_secs)
    }

    /// Create a provider pointed at a different LRCLIB-compatible API root.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!(
                "Lyricsync/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/kvnxiao/lyricsync)"
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn get_url(&self, query: &LyricsQuery) -> String {
        let mut url = format!(
            "{}/get?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(&query.artist),
            urlencoding::encode(&query.song)
        );

        if !query.album.is_empty() {
            let _ = write!(url, "&album_name={}", urlencoding::encode(&query.album));
        }

        let _ = write!(url, "&duration={}", query.duration_secs());
        url
    }

    fn search_url(&self, query: &LyricsQuery) -> String {
        let search_query = format!("{} {}", query.artist, query.song);
        format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(&search_query)
        )
    }

    /// Fall back to the search endpoint when there is no exact match
    async fn search(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
        let url = self.search_url(query);
        debug!(target: LOG_TARGET, "LRCLIB request URL (search): {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB search returned status: {}", response.status());
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("LRCLIB search returned status: {}", response.status()),
            });
        }

        let results: Vec<LrclibResponse> = response.json().await?;

        match pick_best(results, query.duration_secs()) {
            Some(result) => {
                info!(
                    target: LOG_TARGET,
                    "LRCLIB found match via search (id: {}, artist: {}, duration: {:?})",
                    result.id, result.artist_name, result.duration
                );
                Ok(parse_response(result))
            }
            None => Err(CoreError::LyricsNotFound {
                song: query.song.clone(),
                artist: query.artist.clone(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LrclibResponse {
    id: i64,
    #[serde(rename = "artistName", default)]
    artist_name: String,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
}

fn non_blank(text: Option<&String>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty())
}

/// Choose the best search candidate: synced lyrics first, then the closest
/// duration. Candidates with no lyrics at all are skipped.
fn pick_best(results: Vec<LrclibResponse>, duration_secs: u32) -> Option<LrclibResponse> {
    results
        .into_iter()
        .filter(|r| {
            r.instrumental
                || non_blank(r.synced_lyrics.as_ref())
                || non_blank(r.plain_lyrics.as_ref())
        })
        .min_by_key(|r| {
            let sync_score: i32 = if non_blank(r.synced_lyrics.as_ref()) { 0 } else { 100 };
            sync_score.saturating_add(duration_score(r.duration, duration_secs))
        })
}

fn parse_response(result: LrclibResponse) -> LyricsPayload {
    if result.instrumental {
        debug!(target: LOG_TARGET, "Track is instrumental (lrclib id: {})", result.id);
        return LyricsPayload::NotFound;
    }

    // Prefer synced lyrics
    if let Some(synced) = result.synced_lyrics.filter(|s| !s.trim().is_empty()) {
        debug!(target: LOG_TARGET, "Got synced lyrics (lrclib id: {})", result.id);
        return LyricsPayload::Timed(synced);
    }

    // Fall back to plain lyrics
    if let Some(plain) = result.plain_lyrics.filter(|p| !p.trim().is_empty()) {
        debug!(target: LOG_TARGET, "Got plain lyrics (lrclib id: {})", result.id);
        return LyricsPayload::Plain(plain);
    }

    LyricsPayload::NotFound
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
        info!(
            target: LOG_TARGET,
            "Fetching lyrics from LRCLIB for: {} - {} (duration: {}s)",
            query.artist,
            query.song,
            query.duration_secs()
        );

        // Exact match with artist + track + album + duration
        let url = self.get_url(query);
        debug!(target: LOG_TARGET, "LRCLIB request URL (exact): {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(target: LOG_TARGET, "LRCLIB exact match not found, trying search");
            return self.search(query).await;
        }

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB returned status: {}", response.status());
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("LRCLIB returned status: {}", response.status()),
            });
        }

        let result: LrclibResponse = response.json().await?;
        info!(target: LOG_TARGET, "LRCLIB found match with id: {}", result.id);
        Ok(parse_response(result))
    }
}
