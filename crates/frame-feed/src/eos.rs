//! End-of-stream aggregation across the active channels.

use tracing::{debug, trace};

use crate::model::{Channel, ChannelMap, PipelineType};

/// Combines per-channel end-of-stream notices into one stream-level event.
///
/// Fires once per configuration, when every channel of the configured pipeline has
/// reported. Notices for channels outside the pipeline are ignored.
#[derive(Debug, Default, Clone)]
pub struct EosAggregator {
    expected: Option<PipelineType>,
    seen: ChannelMap<bool>,
    fired: bool,
}

impl EosAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, pipeline: PipelineType) {
        self.expected = Some(pipeline);
        self.reset();
    }

    /// Forget observed notices; keep the configured pipeline.
    pub fn reset(&mut self) {
        self.seen = ChannelMap::default();
        self.fired = false;
    }

    /// Record `channel`'s notice. Returns `true` exactly once, when the set completes.
    pub fn observe(&mut self, channel: Channel) -> bool {
        let Some(pipeline) = self.expected else {
            trace!("eos: {} notice before configuration", channel);
            return false;
        };
        if !pipeline.has(channel) {
            debug!("eos: ignoring {} notice, pipeline is {:?}", channel, pipeline);
            return false;
        }
        if self.fired {
            return false;
        }
        self.seen[channel] = true;
        self.fired = pipeline.channels().all(|c| self.seen[c]);
        self.fired
    }
}
