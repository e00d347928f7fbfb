//! C7's failure taxonomy (§4.7, §7): every external capability collapses
//! its errors into `Temporary` (retriable) or `Permanent` (give up now).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct TemporaryFailure(pub String);

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct PermanentFailure(pub String);

/// The outcome of a single `SmtpClient::send` call.
#[derive(Debug, Error, Clone)]
pub enum SendError {
    #[error("temporary failure: {0}")]
    Temporary(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl From<TemporaryFailure> for SendError {
    fn from(value: TemporaryFailure) -> Self {
        Self::Temporary(value.0)
    }
}

impl From<PermanentFailure> for SendError {
    fn from(value: PermanentFailure) -> Self {
        Self::Permanent(value.0)
    }
}
