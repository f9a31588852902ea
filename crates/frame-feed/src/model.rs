//! Core data model: channels, frames, pipeline shape and segment descriptors.
//!
//! Timestamps are signed microseconds throughout the crate. Frame-file timestamps are
//! segment-native; the coordinator rewrites them against the active seek offset before
//! they reach the sink.

use std::fmt;
use std::ops::{Index, IndexMut};

use bytes::Bytes;

/// One of the two elementary channels of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Audio,
    Video,
}

impl Channel {
    /// Both channels, audio first.
    pub const ALL: [Channel; 2] = [Channel::Audio, Channel::Video];

    /// File-name stem used by the on-disk layout (`raw_<stem>_frames_<n>`).
    pub fn stem(self) -> &'static str {
        match self {
            Channel::Audio => "audio",
            Channel::Video => "video",
        }
    }

    fn slot(self) -> usize {
        match self {
            Channel::Audio => 0,
            Channel::Video => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Fixed-size per-channel storage, indexable by [`Channel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelMap<T> {
    slots: [T; 2],
}

impl<T> ChannelMap<T> {
    pub fn new(audio: T, video: T) -> Self {
        Self {
            slots: [audio, video],
        }
    }

    /// Iterate `(channel, &value)` pairs, audio first.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::ALL.into_iter().zip(self.slots.iter())
    }

    /// Iterate `(channel, &mut value)` pairs, audio first.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Channel, &mut T)> {
        Channel::ALL.into_iter().zip(self.slots.iter_mut())
    }
}

impl<T> Index<Channel> for ChannelMap<T> {
    type Output = T;

    fn index(&self, channel: Channel) -> &T {
        &self.slots[channel.slot()]
    }
}

impl<T> IndexMut<Channel> for ChannelMap<T> {
    fn index_mut(&mut self, channel: Channel) -> &mut T {
        &mut self.slots[channel.slot()]
    }
}

/// Which channels a segment carries.
///
/// Recomputed every time a segment's end time is calculated, from the presence of the
/// per-channel index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineType {
    #[default]
    AudioVideo,
    AudioOnly,
    VideoOnly,
}

impl PipelineType {
    /// Derive the pipeline shape from channel presence. `None` if neither channel exists.
    pub fn from_presence(has_audio: bool, has_video: bool) -> Option<Self> {
        match (has_audio, has_video) {
            (true, true) => Some(PipelineType::AudioVideo),
            (true, false) => Some(PipelineType::AudioOnly),
            (false, true) => Some(PipelineType::VideoOnly),
            (false, false) => None,
        }
    }

    pub fn has(self, channel: Channel) -> bool {
        match (self, channel) {
            (PipelineType::AudioVideo, _) => true,
            (PipelineType::AudioOnly, Channel::Audio) => true,
            (PipelineType::VideoOnly, Channel::Video) => true,
            _ => false,
        }
    }

    /// Active channels in audio-first order.
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.has(*c))
    }

    pub fn channel_count(self) -> usize {
        self.channels().count()
    }
}

/// A single timestamped frame read from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: Channel,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
    pub payload: Bytes,
}

impl Frame {
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Return the frame with its timestamp shifted back by `offset_us`.
    pub fn rebased(mut self, offset_us: i64) -> Self {
        self.timestamp_us -= offset_us;
        self
    }
}

/// Timing facts for one segment, computed by scanning its index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub index: u32,
    /// End time in microseconds: the smaller of the per-channel maxima when both
    /// channels are present, otherwise the single channel's maximum. Zero when the
    /// segment has no records at all.
    pub end_time_us: i64,
    /// Smallest first timestamp across channels. `None` when no channel has a record.
    pub start_time_us: Option<i64>,
    /// `None` when neither index file exists.
    pub pipeline: Option<PipelineType>,
}
