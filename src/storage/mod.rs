//! Local storage

pub mod recording_cache;

pub use recording_cache::{CacheEntryMeta, CacheError, RecordingCache, SESSION_VIDEO_KEY};
