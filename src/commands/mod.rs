//! Command handlers
//!
//! The application-facing surface a UI shell (or the terminal driver) calls.
//! Every handler returns `ErrorResponse` on failure so callers get a stable
//! error code instead of a formatted string.

pub mod devices;
pub mod interview;

pub use interview::InterviewState;
