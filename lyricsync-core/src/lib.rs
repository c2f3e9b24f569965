pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fetcher;
pub mod lrc;
pub mod paths;
pub mod presence;
pub mod provider;
pub mod providers;
pub mod scheduler;
pub mod time;

pub use clock::{Clock, SystemClock, TrackWindow};
pub use config::{
    LoggingConfig, LyricsConfig, LyricsProviderType, LyricsyncConfig, SyncConfig,
};
pub use cursor::{locate, CursorState};
pub use error::{CoreError, Result};
pub use fetcher::LyricsFetcher;
pub use lrc::{parse_timed, parse_untimed, LyricLine, LyricSequence};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use presence::{parse_presence_update, Presence, PresenceUpdate, Timestamps, TrackKey};
pub use provider::{LyricsPayload, LyricsProvider, LyricsQuery};
pub use providers::LocalLyricsProvider;
pub use scheduler::{
    FetchTicket, LyricStatus, SessionInput, SessionState, SyncEvent, SyncScheduler, SyncSession,
    SyncSettings, SyncSnapshot,
};
pub use time::{millis_to_duration, DurationExt};
