use crate::error::CoreError;
use crate::provider::{LyricsPayload, LyricsProvider, LyricsQuery};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOG_TARGET: &str = "lyricsync::provider::local";

/// Reads lyrics from `<dir>/<artist> - <song>.lrc`, falling back to a
/// plain `.txt` file of the same name.
pub struct LocalLyricsProvider {
    dir: PathBuf,
}

impl LocalLyricsProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, query: &LyricsQuery, extension: &str) -> PathBuf {
        let stem = format!(
            "{} - {}",
            sanitize_component(&query.artist),
            sanitize_component(&query.song)
        );
        self.dir.join(format!("{stem}.{extension}"))
    }
}

/// Path separators in tag values would escape the lyrics directory
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, CoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl LyricsProvider for LocalLyricsProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<LyricsPayload, CoreError> {
        let timed_path = self.path_for(query, "lrc");
        debug!(target: LOG_TARGET, "Looking for {}", timed_path.display());
        if let Some(raw) = read_if_exists(&timed_path).await? {
            return Ok(LyricsPayload::Timed(raw));
        }

        let plain_path = self.path_for(query, "txt");
        debug!(target: LOG_TARGET, "Looking for {}", plain_path.display());
        if let Some(raw) = read_if_exists(&plain_path).await? {
            return Ok(LyricsPayload::Plain(raw));
        }

        Ok(LyricsPayload::NotFound)
    }
}
