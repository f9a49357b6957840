//! Recording module
//!
//! Segment recorders buffer chunks from a borrowed stream into blobs:
//! - SegmentRecorder for one start/stop cycle at a time
//! - MediaBlob as the finished output

pub mod segment;
pub mod state;

pub use segment::{negotiate_mime, RecorderError, RecorderResult, SegmentRecorder};
pub use state::{extension_for, MediaBlob, RecorderState};
