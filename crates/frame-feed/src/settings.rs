//! Unified configuration for the `frame-feed` crate.
//!
//! Every cadence in here stands in for latency a real network-backed source would have:
//! per-channel read intervals model fetch latency, the seek completion delay models the
//! asynchronous flush acknowledgement of a chunk demuxer. They are plain settings so tests
//! can shrink them and demos can stretch them.

use std::fmt;
use std::time::Duration;

/// Number of position samples kept by the playback position tracker.
pub const POSITION_HISTORY_CAPACITY: usize = 10;

/// Default audio feed cadence.
pub const DEFAULT_AUDIO_READ_INTERVAL: Duration = Duration::from_millis(10);
/// Default video feed cadence.
pub const DEFAULT_VIDEO_READ_INTERVAL: Duration = Duration::from_millis(25);
/// Default position poll cadence.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default simulated flush acknowledgement latency.
pub const DEFAULT_SEEK_COMPLETION_DELAY: Duration = Duration::from_millis(50);

/// What to do once the last segment has been played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Wrap to segment 0 and keep playing.
    #[default]
    Loop,
    /// Signal end-of-stream downstream and finish once every active channel drained.
    Stop,
}

/// Unified settings for the feed coordinator.
#[derive(Clone)]
pub struct FeedSettings {
    // ----------------------------
    // Feed cadence
    // ----------------------------
    /// Interval between audio frame reads while feeding.
    /// Default: 10ms.
    pub audio_read_interval: Duration,

    /// Interval between video frame reads while feeding.
    /// Default: 25ms.
    pub video_read_interval: Duration,

    // ----------------------------
    // Position polling / transitions
    // ----------------------------
    /// Interval between position oracle polls (and transition checks).
    /// Default: 50ms.
    pub status_poll_interval: Duration,

    /// Delay between issuing a flush and restarting the feeders.
    /// Default: 50ms.
    pub seek_completion_delay: Duration,

    /// A segment transition triggers once the tracked position is within this distance
    /// of the segment end time.
    /// Default: zero (only reaching or passing the end time, or a stall, triggers).
    pub segment_end_tolerance: Duration,

    /// Behaviour once no further segment exists.
    /// Default: `Loop`.
    pub exhaustion_policy: ExhaustionPolicy,

    /// Pause the downstream around the flush of a segment transition.
    /// Default: false.
    pub pause_before_seek: bool,

    // ----------------------------
    // Diagnostics
    // ----------------------------
    /// How often the playback position is logged at `info`.
    /// Default: 1 second.
    pub position_log_interval: Duration,

    /// Capacity of the out-of-band event broadcast channel.
    /// Default: 64.
    pub event_capacity: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            audio_read_interval: DEFAULT_AUDIO_READ_INTERVAL,
            video_read_interval: DEFAULT_VIDEO_READ_INTERVAL,

            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            seek_completion_delay: DEFAULT_SEEK_COMPLETION_DELAY,
            segment_end_tolerance: Duration::ZERO,
            exhaustion_policy: ExhaustionPolicy::Loop,
            pause_before_seek: false,

            position_log_interval: Duration::from_secs(1),
            event_capacity: 64,
        }
    }
}

impl fmt::Debug for FeedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSettings")
            // Feed
            .field("audio_read_interval", &self.audio_read_interval)
            .field("video_read_interval", &self.video_read_interval)
            // Transitions
            .field("status_poll_interval", &self.status_poll_interval)
            .field("seek_completion_delay", &self.seek_completion_delay)
            .field("segment_end_tolerance", &self.segment_end_tolerance)
            .field("exhaustion_policy", &self.exhaustion_policy)
            .field("pause_before_seek", &self.pause_before_seek)
            // Diagnostics
            .field("position_log_interval", &self.position_log_interval)
            .finish_non_exhaustive()
    }
}

impl FeedSettings {
    // -------------------------
    // Constructors
    // -------------------------

    /// Create default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond cadences everywhere. Keeps the relative ordering of the defaults
    /// (audio faster than video) while making whole-stream runs short.
    pub fn fast(mut self) -> Self {
        self.audio_read_interval = Duration::from_millis(1);
        self.video_read_interval = Duration::from_millis(2);
        self.status_poll_interval = Duration::from_millis(5);
        self.seek_completion_delay = Duration::from_millis(5);
        self
    }

    // -------------------------
    // Setters
    // -------------------------

    pub fn audio_read_interval(mut self, v: Duration) -> Self {
        self.audio_read_interval = v;
        self
    }

    pub fn video_read_interval(mut self, v: Duration) -> Self {
        self.video_read_interval = v;
        self
    }

    pub fn status_poll_interval(mut self, v: Duration) -> Self {
        self.status_poll_interval = v;
        self
    }

    pub fn seek_completion_delay(mut self, v: Duration) -> Self {
        self.seek_completion_delay = v;
        self
    }

    pub fn segment_end_tolerance(mut self, v: Duration) -> Self {
        self.segment_end_tolerance = v;
        self
    }

    pub fn exhaustion_policy(mut self, v: ExhaustionPolicy) -> Self {
        self.exhaustion_policy = v;
        self
    }

    pub fn pause_before_seek(mut self, v: bool) -> Self {
        self.pause_before_seek = v;
        self
    }

    pub fn position_log_interval(mut self, v: Duration) -> Self {
        self.position_log_interval = v;
        self
    }

    pub fn event_capacity(mut self, v: usize) -> Self {
        self.event_capacity = v;
        self
    }

    /// Tolerance in microseconds, saturating.
    pub(crate) fn segment_end_tolerance_us(&self) -> i64 {
        i64::try_from(self.segment_end_tolerance.as_micros()).unwrap_or(i64::MAX)
    }
}
