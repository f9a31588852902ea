//! A simulated downstream for running `frame-feed` without a media framework.
//!
//! [`SimulatedDownstream`] behaves like a small playback pipeline: it buffers pushed
//! frames per channel, asks for more below a low watermark and says "enough" above a high
//! watermark, and a render task started with [`SimulatedDownstream::spawn_renderer`]
//! consumes buffered frames in real time. The playback clock only moves while playing and
//! while every configured channel has data, so running dry shows up as a position stall.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use frame_feed::{
    Channel, ChannelMap, Frame, FrameSink, PipelineType, SinkError, SinkSignaller,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Buffering limits of the simulated pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DownstreamConfig {
    /// Ask for more data when a channel holds fewer frames than this.
    pub low_watermark: usize,
    /// Say "enough" once a channel holds this many frames.
    pub high_watermark: usize,
    /// Render tick.
    pub render_interval: Duration,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            low_watermark: 8,
            high_watermark: 32,
            render_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Default)]
struct ChannelBuffer {
    frames: VecDeque<Frame>,
    /// Feeding was throttled with "enough".
    throttled: bool,
    eos_requested: bool,
    eos_reported: bool,
}

#[derive(Debug, Default)]
struct State {
    pipeline: Option<PipelineType>,
    playing: bool,
    /// Downstream clock, restarted at every flush.
    clock_us: i64,
    last_render: Option<Instant>,
    buffers: ChannelMap<ChannelBuffer>,
    rendered: u64,
    signaller: Option<SinkSignaller>,
}

/// Cloneable handle to the simulated pipeline.
#[derive(Clone, Default)]
pub struct SimulatedDownstream {
    config: DownstreamConfig,
    state: Arc<Mutex<State>>,
}

impl SimulatedDownstream {
    pub fn new(config: DownstreamConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// Downstream clock, relative to the last flush. `None` before anything was rendered.
    pub fn position(&self) -> Option<i64> {
        let state = self.state.lock();
        (state.rendered > 0).then_some(state.clock_us)
    }

    /// Position oracle for `FrameFeed::spawn`.
    pub fn oracle(&self) -> impl FnMut() -> Option<i64> + Send + 'static {
        let downstream = self.clone();
        move || downstream.position()
    }

    pub fn rendered(&self) -> u64 {
        self.state.lock().rendered
    }

    /// Start the render loop on the current runtime. It ends once the attached feed is gone.
    pub fn spawn_renderer(&self) -> JoinHandle<()> {
        let downstream = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(downstream.config.render_interval);
            loop {
                ticker.tick().await;
                if !downstream.is_feed_connected() {
                    debug!("downstream: feed detached, renderer stopping");
                    break;
                }
                downstream.render(Instant::now());
            }
        })
    }

    /// Whether a feed is attached and still listening. `true` before attachment.
    pub fn is_feed_connected(&self) -> bool {
        self.state
            .lock()
            .signaller
            .as_ref()
            .map_or(true, SinkSignaller::is_connected)
    }

    /// Advance the clock to `now` and consume every frame that became due.
    fn render(&self, now: Instant) {
        let mut state = self.state.lock();
        let elapsed = state
            .last_render
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        state.last_render = Some(now);

        let Some(pipeline) = state.pipeline else {
            return;
        };
        let starved = pipeline
            .channels()
            .any(|c| state.buffers[c].frames.is_empty() && !state.buffers[c].eos_requested);
        if state.playing && !starved {
            state.clock_us += i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
        }

        let clock_us = state.clock_us;
        let mut requests = Vec::new();
        let mut rendered = 0;
        for channel in pipeline.channels() {
            let buffer = &mut state.buffers[channel];
            while buffer
                .frames
                .front()
                .is_some_and(|f| f.timestamp_us <= clock_us)
            {
                buffer.frames.pop_front();
                rendered += 1;
            }
            if buffer.throttled && buffer.frames.len() < self.config.low_watermark {
                buffer.throttled = false;
                requests.push(SinkSignalKind::NeedData(channel));
            }
            if buffer.eos_requested && !buffer.eos_reported && buffer.frames.is_empty() {
                buffer.eos_reported = true;
                requests.push(SinkSignalKind::EndOfStream(channel));
            }
        }
        state.rendered += rendered;
        if rendered > 0 {
            trace!("downstream: rendered {} frames, clock {}us", rendered, clock_us);
        }

        if let Some(signaller) = state.signaller.clone() {
            drop(state);
            for request in requests {
                let _ = match request {
                    SinkSignalKind::NeedData(c) => signaller.need_data(c),
                    SinkSignalKind::EndOfStream(c) => signaller.end_of_stream(c),
                };
            }
        }
    }
}

enum SinkSignalKind {
    NeedData(Channel),
    EndOfStream(Channel),
}

impl FrameSink for SimulatedDownstream {
    fn attach(&mut self, signaller: SinkSignaller) {
        self.state.lock().signaller = Some(signaller);
    }

    fn configure(&mut self, pipeline: PipelineType) -> Result<(), SinkError> {
        debug!("downstream: configured for {:?}", pipeline);
        self.state.lock().pipeline = Some(pipeline);
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) {
        debug!("downstream: playing={}", playing);
        self.state.lock().playing = playing;
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), SinkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let channel = frame.channel;
        if !state.pipeline.is_some_and(|p| p.has(channel)) {
            return Err(SinkError::rejected(channel, "channel not configured"));
        }
        let buffer = &mut state.buffers[channel];
        buffer.frames.push_back(frame);
        if !buffer.throttled && buffer.frames.len() >= self.config.high_watermark {
            buffer.throttled = true;
            if let Some(signaller) = &state.signaller {
                let _ = signaller.enough_data(channel);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        for (_, buffer) in state.buffers.iter_mut() {
            *buffer = ChannelBuffer::default();
        }
        state.clock_us = 0;
        state.rendered = 0;
        debug!("downstream: flushed");
        Ok(())
    }

    fn end_of_stream(&mut self, channel: Channel) -> Result<(), SinkError> {
        self.state.lock().buffers[channel].eos_requested = true;
        Ok(())
    }
}
