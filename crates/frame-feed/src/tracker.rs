//! Playback position tracker.
//!
//! Keeps a fixed ring of the last [`POSITION_HISTORY_CAPACITY`] absolute positions and
//! derives two signals from it:
//! - `has_advanced`: the whole window shows strictly increasing positions, used to confirm
//!   that playback really started after a transition;
//! - `is_stalled`: the whole window holds one identical value, used to force a transition
//!   when downstream stops moving before the segment end time is reached.
//!
//! Both signals require a full window; an unset slot makes both false.

use crate::settings::POSITION_HISTORY_CAPACITY;

#[derive(Debug, Clone)]
pub struct PositionTracker {
    history: [Option<i64>; POSITION_HISTORY_CAPACITY],
    cursor: usize,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            history: [None; POSITION_HISTORY_CAPACITY],
            cursor: 0,
        }
    }

    /// Record `position_us` unless playback is paused.
    pub fn sample(&mut self, position_us: i64, playing: bool) {
        if !playing {
            return;
        }
        self.history[self.cursor] = Some(position_us);
        self.cursor = (self.cursor + 1) % POSITION_HISTORY_CAPACITY;
    }

    /// Most recently recorded position.
    pub fn latest(&self) -> Option<i64> {
        self.history[self.back(1)]
    }

    /// Slot `steps` writes behind the cursor.
    fn back(&self, steps: usize) -> usize {
        (self.cursor + POSITION_HISTORY_CAPACITY - steps) % POSITION_HISTORY_CAPACITY
    }

    pub fn has_advanced(&self) -> bool {
        (1..POSITION_HISTORY_CAPACITY).all(|step| {
            match (self.history[self.back(step)], self.history[self.back(step + 1)]) {
                (Some(newer), Some(older)) => newer > older,
                _ => false,
            }
        })
    }

    pub fn is_stalled(&self) -> bool {
        match self.history[0] {
            Some(first) => self.history.iter().all(|slot| *slot == Some(first)),
            None => false,
        }
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.history = [None; POSITION_HISTORY_CAPACITY];
        self.cursor = 0;
    }
}
