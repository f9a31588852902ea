//! Deterministic on-disk layout of segment frame files.
//!
//! Layout (per segment `n`, per channel):
//! - data:  `<root>/raw_<channel>_frames_<n>.bin`
//! - index: `<root>/raw_<channel>_frames_<n>.txt`
//!
//! A segment exists when at least one of its index files exists.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::model::Channel;

/// Data and index file paths for one channel of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    pub data: PathBuf,
    pub index: PathBuf,
}

/// Resolves segment indices to frame-file paths under a root directory.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    root: PathBuf,
}

impl SegmentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stem(channel: Channel, index: u32) -> String {
        format!("raw_{}_frames_{}", channel.stem(), index)
    }

    pub fn paths(&self, channel: Channel, index: u32) -> ChannelPaths {
        let stem = Self::stem(channel, index);
        ChannelPaths {
            data: self.root.join(format!("{stem}.bin")),
            index: self.root.join(format!("{stem}.txt")),
        }
    }

    /// Whether the index file for `channel` exists for segment `index`.
    pub fn has_channel(&self, channel: Channel, index: u32) -> bool {
        self.paths(channel, index).index.is_file()
    }

    /// Probe both index files without opening anything.
    pub fn has_any_channel(&self, index: u32) -> bool {
        let found = Channel::ALL.iter().any(|c| self.has_channel(*c, index));
        trace!(
            "layout: probe segment={} root='{}' found={}",
            index,
            self.root.display(),
            found
        );
        found
    }
}
