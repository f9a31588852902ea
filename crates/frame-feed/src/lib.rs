//! Segmented frame-file feeder for a downstream audio/video pipeline.
//!
//! The crate plays a numbered sequence of on-disk frame files into a sink the way a
//! network-backed adaptive source would: frames are delivered under sink backpressure at
//! per-channel cadences, the playback position is polled to decide when a segment is
//! finished, and the move to the next segment is performed as a flush followed by a
//! timeline rebase.
//!
//! This crate is composed of several modules:
//! - `layout`: on-disk naming of segment data and index files.
//! - `index`: lazy reader for the comma-separated timestamp index.
//! - `store`: `SegmentFrameStore`, the sequential frame reader owning every file handle.
//! - `tracker`: `PositionTracker`, the position history with advance/stall detection.
//! - `feeder`: `Feeder`, one flow-controlled deliverer per channel.
//! - `transition`: the segment transition state machine and its trigger.
//! - `eos`: `EosAggregator`, per-channel end-of-stream aggregation.
//! - `traits` / `signal`: the sink and position-oracle contracts and the sink signal path.
//! - `feed`: `FrameFeed`, the handle to the spawned coordinator, and its events.
//! - `settings` / `error`: configuration and error types.
//!
//! Everything runs on a single tokio task; there is no locking between components.
//!
//! This file (`lib.rs`) acts as a facade: it re-exports the public API.

mod eos;
mod error;
mod feed;
mod feeder;
mod index;
mod layout;
mod model;
mod settings;
mod signal;
mod store;
mod timer;
mod tracker;
mod traits;
mod transition;
mod worker;

pub use crate::eos::EosAggregator;
pub use crate::error::{FeedError, FeedResult, SinkError};
pub use crate::feed::{FeedEvent, FeedStatus, FrameFeed};
pub use crate::feeder::{Feeder, FeederState, TickOutcome};
pub use crate::index::{IndexReader, IndexRecord, IndexSummary};
pub use crate::layout::{ChannelPaths, SegmentLayout};
pub use crate::model::{Channel, ChannelMap, Frame, PipelineType, SegmentInfo};
pub use crate::settings::{
    DEFAULT_AUDIO_READ_INTERVAL, DEFAULT_SEEK_COMPLETION_DELAY, DEFAULT_STATUS_POLL_INTERVAL,
    DEFAULT_VIDEO_READ_INTERVAL, ExhaustionPolicy, FeedSettings, POSITION_HISTORY_CAPACITY,
};
pub use crate::signal::{SinkSignal, SinkSignaller};
pub use crate::store::{EndReason, FrameRead, SegmentFrameStore};
pub use crate::timer::Timer;
pub use crate::tracker::PositionTracker;
pub use crate::traits::{FrameSink, PositionOracle};
pub use crate::transition::{
    AdvanceReason, SeekOperation, SegmentTransition, TransitionState, TriggerInput,
    should_advance,
};
