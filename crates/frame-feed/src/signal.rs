//! Sink-to-coordinator flow-control signals.
//!
//! Sinks receive a [`SinkSignaller`] when attached and use it to report, per channel,
//! "need more data", "enough data" and "end of stream". Signals travel over an unbounded
//! channel so a sink may raise them synchronously from inside `push_frame`, which itself
//! runs on the coordinator task.

use tokio::sync::mpsc;

use crate::error::{FeedError, FeedResult};
use crate::model::Channel;

/// A flow-control notice from the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSignal {
    NeedData(Channel),
    EnoughData(Channel),
    /// Downstream confirmed that `channel` drained after an end-of-stream.
    EndOfStream(Channel),
}

/// Cloneable handle used by sinks to raise [`SinkSignal`]s.
#[derive(Debug, Clone)]
pub struct SinkSignaller {
    tx: mpsc::UnboundedSender<SinkSignal>,
}

impl SinkSignaller {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<SinkSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, signal: SinkSignal) -> FeedResult<()> {
        self.tx.send(signal).map_err(|_| FeedError::WorkerGone)
    }

    pub fn need_data(&self, channel: Channel) -> FeedResult<()> {
        self.send(SinkSignal::NeedData(channel))
    }

    pub fn enough_data(&self, channel: Channel) -> FeedResult<()> {
        self.send(SinkSignal::EnoughData(channel))
    }

    pub fn end_of_stream(&self, channel: Channel) -> FeedResult<()> {
        self.send(SinkSignal::EndOfStream(channel))
    }

    /// Whether the coordinator is still listening.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}
