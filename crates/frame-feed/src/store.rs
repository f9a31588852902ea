//! Segment frame store: sequential frame reader over numbered segment file pairs.
//!
//! The store owns every open file handle. Files for a channel are opened lazily on the
//! first read of the current segment and stay open until [`SegmentFrameStore::close_all`]
//! (or an advance, which closes first). Closing is unconditional and idempotent.
//!
//! End-of-file on either the index or the data file is the normal way a segment ends and
//! is reported as [`FrameRead::EndOfSegment`], never as an error.

use std::fs::File;
use std::io::{self, BufReader, Read};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::index::{IndexReader, IndexSummary};
use crate::layout::SegmentLayout;
use crate::model::{Channel, ChannelMap, Frame, PipelineType, SegmentInfo};

/// Upper bound on the buffer reserved up front for a payload. Index sizes are not trusted;
/// larger payloads grow the buffer as bytes actually arrive.
const MAX_PAYLOAD_RESERVE: usize = 1 << 20;

/// Why a channel stopped producing frames for the current segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The index file has no further records.
    Exhausted,
    /// An index record promised more payload bytes than the data file had left.
    ShortRead,
    /// An I/O error occurred while reading; treated as the end of the segment.
    ReadFailed,
}

/// Outcome of a single frame read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    Frame(Frame),
    EndOfSegment(EndReason),
    /// The channel's file pair for the current segment does not exist.
    NotOpen,
}

#[derive(Debug, Default)]
enum ChannelFiles {
    #[default]
    Closed,
    /// Opening was attempted for this segment and at least one file was absent.
    Missing,
    Open {
        data: BufReader<File>,
        index: IndexReader<BufReader<File>>,
    },
}

/// Sequential reader over `raw_<channel>_frames_<n>` file pairs.
#[derive(Debug)]
pub struct SegmentFrameStore {
    layout: SegmentLayout,
    current: u32,
    files: ChannelMap<ChannelFiles>,
}

impl SegmentFrameStore {
    pub fn new(layout: SegmentLayout) -> Self {
        Self {
            layout,
            current: 0,
            files: ChannelMap::default(),
        }
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn current_index(&self) -> u32 {
        self.current
    }

    /// Whether any channel of segment `index` exists, probed without opening.
    pub fn segment_has_any_channel(&self, index: u32) -> bool {
        self.layout.has_any_channel(index)
    }

    pub fn is_open(&self, channel: Channel) -> bool {
        matches!(self.files[channel], ChannelFiles::Open { .. })
    }

    /// Close the current segment's files and point the store at `index`.
    pub fn advance_to(&mut self, index: u32) {
        self.close_all();
        trace!("store: advance {} -> {}", self.current, index);
        self.current = index;
    }

    /// Release every open handle. Safe to call any number of times.
    pub fn close_all(&mut self) {
        for (channel, files) in self.files.iter_mut() {
            if matches!(files, ChannelFiles::Open { .. }) {
                trace!("store: close {} files for segment {}", channel, self.current);
            }
            *files = ChannelFiles::Closed;
        }
    }

    /// Open `channel`'s file pair for the current segment if not already attempted.
    /// Returns whether the channel is readable.
    pub fn open(&mut self, channel: Channel) -> bool {
        if matches!(self.files[channel], ChannelFiles::Closed) {
            let paths = self.layout.paths(channel, self.current);
            self.files[channel] = match (File::open(&paths.data), IndexReader::open(&paths.index)) {
                (Ok(data), Ok(index)) => {
                    debug!(
                        "store: opened {} segment {} ('{}')",
                        channel,
                        self.current,
                        paths.data.display()
                    );
                    ChannelFiles::Open {
                        data: BufReader::new(data),
                        index,
                    }
                }
                (data, index) => {
                    trace!(
                        "store: {} segment {} unavailable (data ok={}, index ok={})",
                        channel,
                        self.current,
                        data.is_ok(),
                        index.is_ok()
                    );
                    ChannelFiles::Missing
                }
            };
        }
        self.is_open(channel)
    }

    /// Read the next frame of `channel` from the current segment.
    pub fn next_frame(&mut self, channel: Channel) -> FrameRead {
        if !self.open(channel) {
            return FrameRead::NotOpen;
        }
        let segment = self.current;
        let ChannelFiles::Open { data, index } = &mut self.files[channel] else {
            return FrameRead::NotOpen;
        };

        let record = match index.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => return FrameRead::EndOfSegment(EndReason::Exhausted),
            Err(e) => {
                warn!("store: {} index read failed in segment {}: {}", channel, segment, e);
                return FrameRead::EndOfSegment(EndReason::ReadFailed);
            }
        };

        let mut payload = Vec::with_capacity(record.size.min(MAX_PAYLOAD_RESERVE));
        match read_payload(data, record.size, &mut payload) {
            Ok(n) if n == record.size => FrameRead::Frame(Frame {
                channel,
                timestamp_us: record.timestamp_us,
                payload: Bytes::from(payload),
            }),
            Ok(n) => {
                warn!(
                    "store: short {} read in segment {} at {}us: wanted {} bytes, got {}",
                    channel, segment, record.timestamp_us, record.size, n
                );
                FrameRead::EndOfSegment(EndReason::ShortRead)
            }
            Err(e) => {
                warn!("store: {} data read failed in segment {}: {}", channel, segment, e);
                FrameRead::EndOfSegment(EndReason::ReadFailed)
            }
        }
    }

    /// Scan segment `index`'s index files for its end time, start time and shape.
    pub fn describe(&self, index: u32) -> io::Result<SegmentInfo> {
        let audio = IndexSummary::scan(&self.layout.paths(Channel::Audio, index).index)?;
        let video = IndexSummary::scan(&self.layout.paths(Channel::Video, index).index)?;

        // Non-positive maxima carry no end-time information.
        let positive_max = |s: &Option<IndexSummary>| {
            s.and_then(|s| s.max_timestamp_us).filter(|t| *t > 0)
        };
        let end_time_us = match (positive_max(&audio), positive_max(&video)) {
            (Some(a), Some(v)) => a.min(v),
            (Some(a), None) => a,
            (None, Some(v)) => v,
            (None, None) => 0,
        };

        let start_time_us = [audio, video]
            .iter()
            .filter_map(|s| s.and_then(|s| s.first_timestamp_us))
            .min();

        let info = SegmentInfo {
            index,
            end_time_us,
            start_time_us,
            pipeline: PipelineType::from_presence(audio.is_some(), video.is_some()),
        };
        debug!("store: described segment {:?}", info);
        Ok(info)
    }
}

fn read_payload<R: Read>(reader: &mut R, size: usize, out: &mut Vec<u8>) -> io::Result<usize> {
    reader.by_ref().take(size as u64).read_to_end(out)
}
