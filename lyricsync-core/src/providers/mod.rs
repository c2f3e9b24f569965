//! Lyric sources that ship with the core crate.

pub mod local;

pub use local::LocalLyricsProvider;
