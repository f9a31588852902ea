//! Flow-controlled per-channel feeder.
//!
//! A feeder is `Idle` until the sink asks for data, then `Reading`: its timer fires at the
//! channel's cadence and every tick moves one frame from the store to the sink. "Enough
//! data", an explicit stop, or the end of the segment put it back to `Idle` and cancel the
//! timer.
//!
//! The feeder owns no I/O itself. The coordinator passes the store and the sink into
//! [`Feeder::tick`], which keeps every file and sink access on the event loop.

use std::time::Duration;

use tracing::{trace, warn};

use crate::model::Channel;
use crate::store::{EndReason, FrameRead, SegmentFrameStore};
use crate::timer::Timer;
use crate::traits::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeederState {
    #[default]
    Idle,
    Reading,
}

/// What a single feed tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered,
    /// The sink refused the frame; it was dropped and feeding continues.
    Rejected,
    /// The channel ran out of frames for this segment; the feeder went idle.
    Drained(EndReason),
    /// The channel has no files in this segment; the feeder went idle.
    NotOpen,
    /// The feeder was not reading.
    Skipped,
}

#[derive(Debug)]
pub struct Feeder {
    channel: Channel,
    interval: Duration,
    state: FeederState,
    timer: Timer,
    delivered: u64,
    /// The current segment ran out for this channel. Cleared by [`Feeder::rewind`].
    drained: bool,
}

impl Feeder {
    pub fn new(channel: Channel, interval: Duration) -> Self {
        Self {
            channel,
            interval,
            state: FeederState::Idle,
            timer: Timer::new(),
            delivered: 0,
            drained: false,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn state(&self) -> FeederState {
        self.state
    }

    pub fn is_reading(&self) -> bool {
        self.state == FeederState::Reading
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Frames accepted by the sink since creation.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Sink asked for more data (or the coordinator restarted the feeder).
    ///
    /// No-op while a seek is in progress, when already reading, or once the channel has
    /// drained the current segment, so repeated requests never schedule a second timer.
    /// Returns whether feeding started.
    pub fn on_need_data(&mut self, seeking: bool) -> bool {
        if seeking {
            trace!("feeder[{}]: need-data ignored while seeking", self.channel);
            return false;
        }
        if self.drained {
            trace!("feeder[{}]: need-data ignored, segment drained", self.channel);
            return false;
        }
        if self.is_reading() {
            return false;
        }
        trace!("feeder[{}]: start, every {:?}", self.channel, self.interval);
        self.state = FeederState::Reading;
        self.timer.arm(self.interval);
        true
    }

    /// Sink has enough buffered. Returns whether feeding stopped.
    pub fn on_enough_data(&mut self) -> bool {
        if !self.is_reading() {
            return false;
        }
        trace!("feeder[{}]: enough data", self.channel);
        self.stop();
        true
    }

    /// Cancel the timer and go idle, whatever the current state.
    pub fn stop(&mut self) {
        self.timer.cancel();
        self.state = FeederState::Idle;
    }

    /// A new segment is current: allow reading again.
    pub fn rewind(&mut self) {
        self.drained = false;
    }

    /// Move one frame from `store` to `sink`, shifting its timestamp back by `offset_us`.
    pub fn tick(
        &mut self,
        store: &mut SegmentFrameStore,
        sink: &mut dyn FrameSink,
        offset_us: i64,
    ) -> TickOutcome {
        if !self.is_reading() {
            self.timer.cancel();
            return TickOutcome::Skipped;
        }

        match store.next_frame(self.channel) {
            FrameRead::Frame(frame) => {
                let frame = frame.rebased(offset_us);
                let timestamp_us = frame.timestamp_us;
                self.timer.arm(self.interval);
                match sink.push_frame(frame) {
                    Ok(()) => {
                        self.delivered += 1;
                        trace!("feeder[{}]: pushed frame at {}us", self.channel, timestamp_us);
                        TickOutcome::Delivered
                    }
                    Err(e) => {
                        warn!("feeder[{}]: frame at {}us dropped: {}", self.channel, timestamp_us, e);
                        TickOutcome::Rejected
                    }
                }
            }
            FrameRead::EndOfSegment(reason) => {
                self.stop();
                self.drained = true;
                TickOutcome::Drained(reason)
            }
            FrameRead::NotOpen => {
                self.stop();
                TickOutcome::NotOpen
            }
        }
    }
}
