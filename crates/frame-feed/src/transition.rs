//! Segment transition state machine.
//!
//! ```text
//!            should_advance            target chosen,
//! Playing ----------------> SeekPending -------------> SeekFlushing
//!    ^                          |        flush issued       |
//!    |                          | exhausted, Stop policy    | completion delay
//!    |                          v                           |
//!    |                      Completed                       |
//!    +------------------------------------------------------+
//!                  offset applied, feeders restarted
//! ```
//!
//! Only `Playing` evaluates the trigger, so rapid repeated polls during a transition are
//! no-ops. At most one [`SeekOperation`] exists at a time and it lives only between the
//! decision and the completion.

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionState {
    #[default]
    Playing,
    SeekPending,
    SeekFlushing,
    /// The last segment finished and the stream is not looping.
    Completed,
}

/// Why a transition was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The tracked position reached or passed the segment end time.
    ReachedEnd,
    /// The tracked position is within the configured tolerance of the end time.
    WithinTolerance,
    /// Position did not move for the whole history window while playing.
    Stalled,
}

/// A transition in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekOperation {
    pub target: u32,
    /// Offset subtracted from the target segment's frame timestamps.
    pub start_offset_us: i64,
    /// The target is segment 0 after the last segment was exhausted.
    pub restart: bool,
}

/// Inputs of one trigger evaluation.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInput {
    pub position_us: i64,
    pub end_time_us: i64,
    pub tolerance_us: i64,
    pub playing: bool,
    pub stalled: bool,
}

/// Pure trigger check.
pub fn should_advance(input: TriggerInput) -> Option<AdvanceReason> {
    if input.position_us >= input.end_time_us {
        return Some(AdvanceReason::ReachedEnd);
    }
    if input.end_time_us - input.position_us <= input.tolerance_us {
        return Some(AdvanceReason::WithinTolerance);
    }
    if input.playing && input.stalled {
        return Some(AdvanceReason::Stalled);
    }
    None
}

#[derive(Debug, Default)]
pub struct SegmentTransition {
    state: TransitionState,
    pending: Option<SeekOperation>,
    offset_us: i64,
}

impl SegmentTransition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// A transition is between decision and completion.
    pub fn is_seeking(&self) -> bool {
        matches!(
            self.state,
            TransitionState::SeekPending | TransitionState::SeekFlushing
        )
    }

    /// Offset currently applied to delivered frames.
    pub fn offset_us(&self) -> i64 {
        self.offset_us
    }

    pub fn pending(&self) -> Option<&SeekOperation> {
        self.pending.as_ref()
    }

    /// Evaluate the trigger. Always `None` outside `Playing`.
    pub fn evaluate(&self, input: TriggerInput) -> Option<AdvanceReason> {
        if self.state != TransitionState::Playing {
            return None;
        }
        should_advance(input)
    }

    /// `Playing -> SeekPending`. Returns `false` (and changes nothing) from any other state.
    pub fn begin(&mut self) -> bool {
        if self.state != TransitionState::Playing {
            trace!("transition: begin ignored in {:?}", self.state);
            return false;
        }
        self.state = TransitionState::SeekPending;
        true
    }

    /// `SeekPending -> SeekFlushing` with the chosen target.
    pub fn flushing(&mut self, op: SeekOperation) -> bool {
        if self.state != TransitionState::SeekPending {
            trace!("transition: flushing ignored in {:?}", self.state);
            return false;
        }
        self.pending = Some(op);
        self.state = TransitionState::SeekFlushing;
        true
    }

    /// `SeekFlushing -> Playing`. Consumes the pending operation and applies its offset.
    pub fn complete(&mut self) -> Option<SeekOperation> {
        if self.state != TransitionState::SeekFlushing {
            trace!("transition: complete ignored in {:?}", self.state);
            return None;
        }
        let op = self.pending.take()?;
        self.offset_us = op.start_offset_us;
        self.state = TransitionState::Playing;
        Some(op)
    }

    /// `SeekPending -> Completed`.
    pub fn finish(&mut self) {
        self.pending = None;
        self.state = TransitionState::Completed;
    }

    /// Back to `Playing` at `offset_us` with nothing pending.
    pub fn reset(&mut self, offset_us: i64) {
        self.pending = None;
        self.offset_us = offset_us;
        self.state = TransitionState::Playing;
    }
}
