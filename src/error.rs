use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration that can never produce a valid signal (unreachable timing,
    /// bad channel order, frame shape not matching the encoder).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{what} {value} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        limit: i64,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure reported by a [`Transport`](crate::transport::Transport) write.
///
/// These are passed back to the caller as they are. Nothing in this crate
/// retries a write, a half transmitted frame is already visible on the strip.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("partial write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("device busy")]
    Busy,

    #[error("transmit worker is gone")]
    Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub(crate) fn out_of_range(what: &'static str, value: impl TryInto<i64>, limit: usize) -> Self {
        Error::OutOfRange {
            what,
            value: value.try_into().unwrap_or(i64::MAX),
            limit: i64::try_from(limit).unwrap_or(i64::MAX),
        }
    }
}
