pub mod clock;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod logging;
pub mod signal;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, Shard};
pub use domain::Domain;
pub use envelope::{
    Envelope, EnvelopeStatus, NewEnvelope, DEFAULT_CLEANUP_INTERVAL_SECS,
    DEFAULT_DELIVERY_THREADS, DEFAULT_MAX_DELIVERY_ATTEMPTS, DEFAULT_RETENTION_PERIOD_SECS,
    DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SMTP_PORT,
};
pub use logging::Logger;
pub use signal::Signal;
pub use tracing;
