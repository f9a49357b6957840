//! Interview Coach - mock interviews with recorded answers and video analysis.
//!
//! This is the library crate behind the terminal driver. It provides media
//! capture, the interview flow controller and the interview server client.

pub mod api;
pub mod capture;
pub mod commands;
pub mod config;
pub mod interview;
pub mod media;
pub mod recorder;
pub mod storage;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Only binaries call this.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "interview_coach_lib=debug,interview_coach=debug,reqwest=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
