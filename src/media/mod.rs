//! Media lifetime management

pub mod session;

pub use session::MediaSession;
