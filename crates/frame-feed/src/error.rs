//! Crate-level error types.
//!
//! [`FeedError`] covers the few conditions that stop the coordinator from being built or
//! driven. Everything that can go wrong while feeding (short reads, rejected frames, failed
//! flushes) is logged and absorbed: the coordinator degrades and keeps playing.
//!
//! [`SinkError`] is what a [`crate::FrameSink`] reports back. The coordinator never
//! propagates it out of the event loop; it is surfaced in logs only.

use std::io;
use std::path::PathBuf;

use crate::model::Channel;

/// Result type used by this crate.
pub type FeedResult<T> = Result<T, FeedError>;

/// Unified error type for the `frame-feed` crate.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The frame-file root is missing or not a directory.
    #[error("frame file directory not found: {}", .0.display())]
    MissingRoot(PathBuf),

    /// The root exists but segment 0 has neither an audio nor a video index file.
    #[error("no frame files for segment 0 under {}", .0.display())]
    NoSegments(PathBuf),

    /// The sink failed in a way the caller asked about directly.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// The coordinator task has already exited.
    #[error("feed worker is no longer running")]
    WorkerGone,

    /// Extra context around a lower-level error.
    #[error("{context}: {source}")]
    Context {
        /// What we were doing when the error occurred.
        context: &'static str,
        /// The underlying error.
        #[source]
        source: Box<FeedError>,
    },
}

impl FeedError {
    /// Attach static context to an existing error.
    pub fn with_context(self, context: &'static str) -> Self {
        FeedError::Context {
            context,
            source: Box::new(self),
        }
    }
}

/// Failures reported by a downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink did not accept a pushed frame. The frame is dropped.
    #[error("{channel} frame rejected: {reason}")]
    Rejected { channel: Channel, reason: String },

    /// The sink could not acknowledge a flush request.
    #[error("flush failed: {0}")]
    FlushFailed(String),
}

impl SinkError {
    pub fn rejected(channel: Channel, reason: impl Into<String>) -> Self {
        SinkError::Rejected {
            channel,
            reason: reason.into(),
        }
    }
}
