//! Logging setup, out of scope per spec §1 but carried as ambient stack: a
//! `tracing`/`tracing-subscriber` initializer driven by `LOG_LEVEL`.

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

#[derive(Default)]
pub struct Logger;

impl Logger {
    /// Initialise the global tracing subscriber. Safe to call once at
    /// process startup; panics if a subscriber is already installed.
    pub fn init() {
        let level = if let Ok(level) = std::env::var("LOG_LEVEL") {
            match level.to_ascii_lowercase().as_str() {
                "warn" => LevelFilter::WARN,
                "info" => LevelFilter::INFO,
                "debug" => LevelFilter::DEBUG,
                "trace" => LevelFilter::TRACE,
                _ => LevelFilter::ERROR,
            }
        } else if cfg!(debug_assertions) {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        tracing_subscriber::Registry::default()
            .with(
                (if cfg!(debug_assertions) {
                    tracing_subscriber::fmt::layer()
                } else {
                    tracing_subscriber::fmt::layer()
                        .with_file(false)
                        .with_line_number(false)
                })
                .compact()
                .with_ansi(true)
                .with_filter(level),
            )
            .init();
    }
}
