//! Collaborator contracts: the downstream sink and the position oracle.
//!
//! The coordinator drives both from its own task and never shares them, so neither trait
//! needs interior synchronisation. Implementations that expose state to other tasks (for
//! example a test harness inspecting what was pushed) bring their own locking.

use crate::error::SinkError;
use crate::model::{Channel, Frame, PipelineType};
use crate::signal::SinkSignaller;

/// The downstream consumer of frames.
///
/// Only `push_frame` and `flush` are required. Flow control travels the other way through
/// the [`SinkSignaller`] handed over in [`FrameSink::attach`].
pub trait FrameSink: Send + 'static {
    /// Called once when the coordinator is spawned.
    fn attach(&mut self, signaller: SinkSignaller) {
        let _ = signaller;
    }

    /// Register the channels that will receive frames. Called on the first poll after
    /// spawn or resume, and again whenever a transition changes the pipeline shape.
    fn configure(&mut self, pipeline: PipelineType) -> Result<(), SinkError> {
        let _ = pipeline;
        Ok(())
    }

    /// Switch the downstream between playing and paused.
    fn set_playing(&mut self, playing: bool) {
        let _ = playing;
    }

    /// Take ownership of one frame. A rejected frame is dropped by the caller.
    fn push_frame(&mut self, frame: Frame) -> Result<(), SinkError>;

    /// Discard buffered data and accept a new timeline origin. Completion is
    /// acknowledged asynchronously; the coordinator waits a fixed delay.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// No further frames will arrive for `channel`. The sink is expected to answer with
    /// [`SinkSignaller::end_of_stream`] once the channel drained.
    fn end_of_stream(&mut self, channel: Channel) -> Result<(), SinkError> {
        let _ = channel;
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn attach(&mut self, signaller: SinkSignaller) {
        (**self).attach(signaller)
    }

    fn configure(&mut self, pipeline: PipelineType) -> Result<(), SinkError> {
        (**self).configure(pipeline)
    }

    fn set_playing(&mut self, playing: bool) {
        (**self).set_playing(playing)
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), SinkError> {
        (**self).push_frame(frame)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }

    fn end_of_stream(&mut self, channel: Channel) -> Result<(), SinkError> {
        (**self).end_of_stream(channel)
    }
}

/// Reports the downstream playback position.
pub trait PositionOracle: Send + 'static {
    /// Position in microseconds on the downstream timeline (which restarts at zero after
    /// every flush), or `None` when unavailable.
    fn current_position(&mut self) -> Option<i64>;
}

impl<F> PositionOracle for F
where
    F: FnMut() -> Option<i64> + Send + 'static,
{
    fn current_position(&mut self) -> Option<i64> {
        self()
    }
}
