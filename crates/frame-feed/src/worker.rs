use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::eos::EosAggregator;
use crate::feed::{FeedCommand, FeedEvent, FeedStatus};
use crate::feeder::{Feeder, TickOutcome};
use crate::model::{Channel, ChannelMap, PipelineType, SegmentInfo};
use crate::settings::{ExhaustionPolicy, FeedSettings};
use crate::signal::{SinkSignal, SinkSignaller};
use crate::store::SegmentFrameStore;
use crate::timer::Timer;
use crate::tracker::PositionTracker;
use crate::traits::{FrameSink, PositionOracle};
use crate::transition::{
    AdvanceReason, SeekOperation, SegmentTransition, TransitionState, TriggerInput,
};

/// Everything the worker needs, assembled by `FrameFeed::spawn`.
pub(crate) struct WorkerParts {
    pub settings: FeedSettings,
    pub store: SegmentFrameStore,
    pub first_segment: SegmentInfo,
    pub pipeline: PipelineType,
    pub sink: Box<dyn FrameSink>,
    pub oracle: Box<dyn PositionOracle>,
    pub commands: mpsc::Receiver<FeedCommand>,
    pub signals: mpsc::UnboundedReceiver<SinkSignal>,
    pub signaller: SinkSignaller,
    pub cancel_token: CancellationToken,
    pub event_sender: broadcast::Sender<FeedEvent>,
}

/// The single event loop owning the store, tracker, feeders, transition machine and
/// aggregator. Every timer and every sink callback is handled here, one at a time.
pub(crate) struct FeedWorker {
    settings: FeedSettings,
    store: SegmentFrameStore,
    tracker: PositionTracker,
    feeders: ChannelMap<Feeder>,
    transition: SegmentTransition,
    eos: EosAggregator,
    sink: Box<dyn FrameSink>,
    oracle: Box<dyn PositionOracle>,

    commands: mpsc::Receiver<FeedCommand>,
    signals: mpsc::UnboundedReceiver<SinkSignal>,
    // Held so `signals` stays open even if the sink drops its signaller.
    _signaller: SinkSignaller,
    cancel_token: CancellationToken,
    event_sender: broadcast::Sender<FeedEvent>,

    poll_timer: Timer,
    seek_timer: Timer,

    pipeline: PipelineType,
    end_time_us: i64,
    /// Last known absolute position.
    position_us: i64,
    configured: bool,
    playing: bool,
    active: bool,
    playback_started: bool,
    resume_after_seek: bool,
    last_position_log: Option<Instant>,
    finished: bool,
}

impl FeedWorker {
    pub(crate) fn new(parts: WorkerParts) -> Self {
        let feeders = ChannelMap::new(
            Feeder::new(Channel::Audio, parts.settings.audio_read_interval),
            Feeder::new(Channel::Video, parts.settings.video_read_interval),
        );
        Self {
            store: parts.store,
            tracker: PositionTracker::new(),
            feeders,
            transition: SegmentTransition::new(),
            eos: EosAggregator::new(),
            sink: parts.sink,
            oracle: parts.oracle,
            commands: parts.commands,
            signals: parts.signals,
            _signaller: parts.signaller,
            cancel_token: parts.cancel_token,
            event_sender: parts.event_sender,
            poll_timer: Timer::new(),
            seek_timer: Timer::new(),
            pipeline: parts.pipeline,
            end_time_us: parts.first_segment.end_time_us,
            position_us: 0,
            configured: false,
            playing: false,
            active: true,
            playback_started: false,
            resume_after_seek: false,
            last_position_log: None,
            finished: false,
            settings: parts.settings,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "feed worker started: root='{}' pipeline={:?} end={}us",
            self.store.layout().root().display(),
            self.pipeline,
            self.end_time_us
        );
        self.poll_timer.arm(self.settings.status_poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    trace!("feed worker: cancelled");
                    break;
                }
                Some(signal) = self.signals.recv() => self.on_signal(signal),
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => {
                        trace!("feed worker: handle dropped");
                        break;
                    }
                },
                _ = self.seek_timer.expired(), if self.seek_timer.is_armed() => {
                    self.seek_timer.cancel();
                    self.complete_transition();
                }
                _ = self.poll_timer.expired(), if self.poll_timer.is_armed() => self.on_poll(),
                _ = self.feeders[Channel::Audio].timer().expired(),
                    if self.feeders[Channel::Audio].timer().is_armed() =>
                {
                    self.on_feed_tick(Channel::Audio);
                }
                _ = self.feeders[Channel::Video].timer().expired(),
                    if self.feeders[Channel::Video].timer().is_armed() =>
                {
                    self.on_feed_tick(Channel::Video);
                }
            }

            if self.finished {
                break;
            }
        }

        self.teardown();
        debug!("feed worker finished");
    }

    fn emit(&self, event: FeedEvent) {
        trace!("feed event: {:?}", event);
        let _ = self.event_sender.send(event);
    }

    fn seeking(&self) -> bool {
        self.transition.state() != TransitionState::Playing
    }

    fn describe_or_empty(&self, index: u32) -> SegmentInfo {
        self.store.describe(index).unwrap_or_else(|e| {
            warn!("feed: cannot scan segment {} index files: {}", index, e);
            SegmentInfo {
                index,
                end_time_us: 0,
                start_time_us: None,
                pipeline: None,
            }
        })
    }

    // ----------------------------
    // Commands
    // ----------------------------

    #[instrument(skip(self))]
    fn on_command(&mut self, cmd: FeedCommand) {
        match cmd {
            FeedCommand::TogglePause => self.toggle_pause(),
            FeedCommand::Suspend => self.suspend(),
            FeedCommand::Resume => self.resume(),
            FeedCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn toggle_pause(&mut self) {
        if !self.active || !self.configured {
            debug!("feed: pause toggle ignored before playback is configured");
            return;
        }
        self.playing = !self.playing;
        self.sink.set_playing(self.playing);
        if self.playing {
            info!("feed: resumed");
            self.emit(FeedEvent::Resumed);
        } else {
            info!("feed: paused");
            self.emit(FeedEvent::Paused);
        }
    }

    fn suspend(&mut self) {
        if !self.active {
            return;
        }
        self.teardown();
        self.discard_downstream();
        self.active = false;
        info!("feed: suspended");
        self.emit(FeedEvent::Suspended);
    }

    fn resume(&mut self) {
        if self.active {
            if self.transition.state() != TransitionState::Completed {
                return;
            }
            self.teardown();
            self.discard_downstream();
        }

        self.store.advance_to(0);
        for (_, feeder) in self.feeders.iter_mut() {
            feeder.rewind();
        }
        self.tracker.reset();
        self.transition.reset(0);
        self.eos.reset();
        let info = self.describe_or_empty(0);
        self.end_time_us = info.end_time_us;
        if let Some(pipeline) = info.pipeline {
            self.pipeline = pipeline;
        }
        self.position_us = 0;
        self.configured = false;
        self.playing = false;
        self.playback_started = false;
        self.resume_after_seek = false;
        self.last_position_log = None;
        self.active = true;
        self.poll_timer.arm(self.settings.status_poll_interval);

        info!("feed: reactivated at segment 0");
        self.emit(FeedEvent::Reactivated);
    }

    /// Cancel every timer, stop the feeders and close all files. Idempotent.
    fn teardown(&mut self) {
        self.poll_timer.cancel();
        self.seek_timer.cancel();
        for (_, feeder) in self.feeders.iter_mut() {
            feeder.stop();
        }
        self.store.close_all();
        if self.configured && self.playing {
            self.sink.set_playing(false);
        }
    }

    /// Drop whatever the downstream still buffers from the abandoned timeline.
    fn discard_downstream(&mut self) {
        if !self.configured {
            return;
        }
        if let Err(e) = self.sink.flush() {
            warn!("feed: flush on teardown failed: {}", e);
        }
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            segment: self.store.current_index(),
            state: self.transition.state(),
            pipeline: self.pipeline,
            end_time_us: self.end_time_us,
            offset_us: self.transition.offset_us(),
            position_us: self.position_us,
            configured: self.configured,
            playing: self.playing,
            active: self.active,
            playback_started: self.playback_started,
            feeders: ChannelMap::new(
                self.feeders[Channel::Audio].state(),
                self.feeders[Channel::Video].state(),
            ),
            delivered: ChannelMap::new(
                self.feeders[Channel::Audio].delivered(),
                self.feeders[Channel::Video].delivered(),
            ),
            seek_target: self.transition.pending().map(|op| op.target),
        }
    }

    // ----------------------------
    // Sink signals
    // ----------------------------

    #[instrument(level = "trace", skip(self))]
    fn on_signal(&mut self, signal: SinkSignal) {
        match signal {
            SinkSignal::NeedData(channel) => {
                if !self.active || !self.configured || !self.pipeline.has(channel) {
                    trace!("feed: need-data for {} ignored", channel);
                    return;
                }
                let seeking = self.seeking();
                self.feeders[channel].on_need_data(seeking);
            }
            SinkSignal::EnoughData(channel) => {
                self.feeders[channel].on_enough_data();
            }
            SinkSignal::EndOfStream(channel) => {
                debug!("feed: {} reported end of stream", channel);
                if self.eos.observe(channel) {
                    info!("feed: every active channel drained");
                    self.emit(FeedEvent::EndOfStream);
                    if self.transition.state() == TransitionState::Completed {
                        self.finished = true;
                    }
                }
            }
        }
    }

    // ----------------------------
    // Feeding
    // ----------------------------

    #[instrument(level = "trace", skip(self))]
    fn on_feed_tick(&mut self, channel: Channel) {
        let offset_us = self.transition.offset_us();
        let outcome = self.feeders[channel].tick(&mut self.store, &mut *self.sink, offset_us);
        match outcome {
            TickOutcome::Drained(reason) => {
                let segment = self.store.current_index();
                debug!("feed: {} drained segment {} ({:?})", channel, segment, reason);
                self.emit(FeedEvent::SegmentDrained {
                    segment,
                    channel,
                    reason,
                });
            }
            TickOutcome::NotOpen => {
                trace!("feed: {} has no files in segment {}", channel, self.store.current_index());
            }
            TickOutcome::Delivered | TickOutcome::Rejected | TickOutcome::Skipped => {}
        }
    }

    fn start_feeders(&mut self) {
        let seeking = self.seeking();
        for channel in self.pipeline.channels() {
            self.feeders[channel].on_need_data(seeking);
        }
    }

    // ----------------------------
    // Position polling / transitions
    // ----------------------------

    /// Register the active channels with the sink and start playback.
    fn configure_downstream(&mut self) {
        if let Err(e) = self.sink.configure(self.pipeline) {
            warn!("feed: sink configuration failed, continuing: {}", e);
        }
        self.eos.configure(self.pipeline);
        self.configured = true;
        self.playing = true;
        self.sink.set_playing(true);
        info!("feed: downstream configured for {:?}, playing", self.pipeline);
        self.emit(FeedEvent::Configured {
            pipeline: self.pipeline,
        });
        self.start_feeders();
    }

    fn apply_pipeline(&mut self, pipeline: PipelineType) {
        if pipeline == self.pipeline {
            return;
        }
        info!("feed: pipeline {:?} -> {:?}", self.pipeline, pipeline);
        self.pipeline = pipeline;
        if self.configured {
            if let Err(e) = self.sink.configure(pipeline) {
                warn!("feed: sink reconfiguration failed, continuing: {}", e);
            }
            self.eos.configure(pipeline);
            self.emit(FeedEvent::Configured { pipeline });
        }
    }

    fn log_position(&mut self) {
        let now = Instant::now();
        let due = self
            .last_position_log
            .map_or(true, |last| now.duration_since(last) >= self.settings.position_log_interval);
        if due {
            info!(
                "playback position: {:.3} secs (segment {})",
                self.position_us as f64 / 1_000_000.0,
                self.store.current_index()
            );
            self.last_position_log = Some(now);
        }
    }

    #[instrument(level = "trace", skip(self))]
    fn on_poll(&mut self) {
        self.poll_timer.arm(self.settings.status_poll_interval);

        if !self.configured {
            self.configure_downstream();
        }

        if self.transition.state() == TransitionState::Playing {
            if let Some(relative_us) = self.oracle.current_position() {
                let absolute_us = relative_us + self.transition.offset_us();
                self.position_us = absolute_us;
                self.tracker.sample(absolute_us, self.playing);
                if !self.playback_started && self.tracker.has_advanced() {
                    self.playback_started = true;
                    let segment = self.store.current_index();
                    info!("feed: playback started in segment {}", segment);
                    self.emit(FeedEvent::PlaybackStarted { segment });
                }
                self.log_position();
            }
        }

        let input = TriggerInput {
            position_us: self.position_us,
            end_time_us: self.end_time_us,
            tolerance_us: self.settings.segment_end_tolerance_us(),
            playing: self.playing,
            stalled: self.tracker.is_stalled(),
        };
        if let Some(reason) = self.transition.evaluate(input) {
            self.begin_transition(reason);
        }
    }

    #[instrument(skip(self))]
    fn begin_transition(&mut self, reason: AdvanceReason) {
        if !self.transition.begin() {
            return;
        }
        let from = self.store.current_index();
        debug!(
            "feed: leaving segment {} at {}us (end {}us)",
            from, self.position_us, self.end_time_us
        );

        // Feeders stop before files close; files close before the index moves.
        self.tracker.reset();
        self.playback_started = false;
        for (_, feeder) in self.feeders.iter_mut() {
            feeder.stop();
            feeder.rewind();
        }
        self.store.close_all();

        let next = from.saturating_add(1);
        let (target, restart) = if self.store.segment_has_any_channel(next) {
            (next, false)
        } else {
            info!("feed: segment {} was the last one, playback complete", from);
            self.emit(FeedEvent::StreamComplete { last_segment: from });
            match self.settings.exhaustion_policy {
                ExhaustionPolicy::Loop => (0, true),
                ExhaustionPolicy::Stop => {
                    self.finish_stream();
                    return;
                }
            }
        };

        self.emit(FeedEvent::SeekStarted {
            from,
            to: target,
            reason,
        });
        self.store.advance_to(target);

        let info = self.describe_or_empty(target);
        self.end_time_us = info.end_time_us;
        if let Some(pipeline) = info.pipeline {
            self.apply_pipeline(pipeline);
        }
        let start_offset_us = info.start_time_us.unwrap_or(0);
        self.position_us = start_offset_us;
        self.eos.reset();

        if self.settings.pause_before_seek && self.playing {
            self.sink.set_playing(false);
            self.resume_after_seek = true;
        }

        self.transition.flushing(SeekOperation {
            target,
            start_offset_us,
            restart,
        });
        if let Err(e) = self.sink.flush() {
            warn!("feed: flush failed, proceeding: {}", e);
        }
        self.seek_timer.arm(self.settings.seek_completion_delay);
    }

    #[instrument(skip(self))]
    fn complete_transition(&mut self) {
        let Some(op) = self.transition.complete() else {
            return;
        };
        if std::mem::take(&mut self.resume_after_seek) && self.playing {
            self.sink.set_playing(true);
        }
        info!(
            "feed: playing segment {} (end {}us, offset {}us)",
            op.target, self.end_time_us, op.start_offset_us
        );
        if op.restart {
            self.emit(FeedEvent::PlaybackRestarted);
        }
        self.emit(FeedEvent::SeekCompleted {
            segment: op.target,
            start_offset_us: op.start_offset_us,
        });
        self.start_feeders();
    }

    /// No further segment and no looping: hand end-of-stream to every active channel.
    fn finish_stream(&mut self) {
        self.transition.finish();
        self.poll_timer.cancel();
        self.seek_timer.cancel();
        self.eos.reset();
        for channel in self.pipeline.channels() {
            if let Err(e) = self.sink.end_of_stream(channel) {
                warn!("feed: end-of-stream for {} failed: {}", channel, e);
            }
        }
        info!("feed: stream finished, waiting for downstream to drain");
    }
}
