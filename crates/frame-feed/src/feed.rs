//! Public handle for a running frame feed.
//!
//! [`FrameFeed::spawn`] validates the frame-file directory, builds the coordinator and runs
//! it as one background task. The handle talks to that task over a command channel, hands
//! out [`SinkSignaller`]s and broadcast receivers for [`FeedEvent`]s, and cancels the task
//! when dropped.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{FeedError, FeedResult};
use crate::feeder::FeederState;
use crate::layout::SegmentLayout;
use crate::model::{Channel, ChannelMap, PipelineType};
use crate::settings::FeedSettings;
use crate::signal::SinkSignaller;
use crate::store::{EndReason, SegmentFrameStore};
use crate::traits::{FrameSink, PositionOracle};
use crate::transition::{AdvanceReason, TransitionState};
use crate::worker::{FeedWorker, WorkerParts};

/// Out-of-band notifications from the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedEvent {
    /// The sink was configured for `pipeline` (first poll, or a shape change on transition).
    Configured { pipeline: PipelineType },
    /// Position advanced across the whole history window in `segment`.
    PlaybackStarted { segment: u32 },
    /// A channel ran out of frames in `segment`.
    SegmentDrained {
        segment: u32,
        channel: Channel,
        reason: EndReason,
    },
    /// A transition was decided; feeders are stopped and the flush is about to be issued.
    SeekStarted {
        from: u32,
        to: u32,
        reason: AdvanceReason,
    },
    /// The flush settled; feeders restarted at the new offset.
    SeekCompleted { segment: u32, start_offset_us: i64 },
    /// Playback wrapped to segment 0 after the last segment.
    PlaybackRestarted,
    /// The last segment finished playing.
    StreamComplete { last_segment: u32 },
    /// Every active channel confirmed its end of stream.
    EndOfStream,
    Paused,
    Resumed,
    Suspended,
    Reactivated,
}

/// Snapshot of the coordinator state.
#[derive(Clone, Debug)]
pub struct FeedStatus {
    pub segment: u32,
    pub state: TransitionState,
    pub pipeline: PipelineType,
    pub end_time_us: i64,
    /// Offset currently subtracted from frame timestamps.
    pub offset_us: i64,
    /// Last known absolute playback position.
    pub position_us: i64,
    pub configured: bool,
    pub playing: bool,
    /// `false` while suspended.
    pub active: bool,
    pub playback_started: bool,
    pub feeders: ChannelMap<FeederState>,
    /// Frames accepted by the sink per channel since the feed was spawned.
    pub delivered: ChannelMap<u64>,
    /// Segment being switched to while a transition is in flight.
    pub seek_target: Option<u32>,
}

#[derive(Debug)]
pub(crate) enum FeedCommand {
    TogglePause,
    Suspend,
    Resume,
    Status(oneshot::Sender<FeedStatus>),
}

/// Handle to a running feed coordinator.
pub struct FrameFeed {
    commands: mpsc::Sender<FeedCommand>,
    signaller: SinkSignaller,
    event_sender: broadcast::Sender<FeedEvent>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FrameFeed {
    /// Spawn the coordinator on the current tokio runtime.
    ///
    /// Fails when `layout`'s root is not a directory or when segment 0 has neither an
    /// audio nor a video index file. The sink is attached immediately; it is configured and
    /// switched to playing on the first position poll.
    pub fn spawn<S, O>(
        layout: SegmentLayout,
        settings: FeedSettings,
        sink: S,
        oracle: O,
    ) -> FeedResult<Self>
    where
        S: FrameSink,
        O: PositionOracle,
    {
        let root = layout.root().to_path_buf();
        if !root.is_dir() {
            return Err(FeedError::MissingRoot(root).with_context("spawning frame feed"));
        }

        let store = SegmentFrameStore::new(layout);
        let first_segment = store
            .describe(0)
            .map_err(|e| FeedError::from(e).with_context("scanning segment 0"))?;
        let pipeline = first_segment
            .pipeline
            .ok_or_else(|| FeedError::NoSegments(root.clone()))?;
        debug!(
            "frame feed: root='{}' first segment {:?} settings={:?}",
            root.display(),
            first_segment,
            settings
        );

        let (signaller, signals) = SinkSignaller::channel();
        let mut sink: Box<dyn FrameSink> = Box::new(sink);
        sink.attach(signaller.clone());

        let (commands, command_receiver) = mpsc::channel(16);
        let (event_sender, _) = broadcast::channel(settings.event_capacity.max(1));
        let cancel_token = CancellationToken::new();

        let worker = FeedWorker::new(WorkerParts {
            settings,
            store,
            first_segment,
            pipeline,
            sink,
            oracle: Box::new(oracle),
            commands: command_receiver,
            signals,
            signaller: signaller.clone(),
            cancel_token: cancel_token.clone(),
            event_sender: event_sender.clone(),
        });
        let task = tokio::spawn(async move {
            trace!("frame feed task started");
            worker.run().await;
            trace!("frame feed task finished");
        });

        Ok(Self {
            commands,
            signaller,
            event_sender,
            cancel_token,
            task: Some(task),
        })
    }

    /// A signaller equivalent to the one handed to the sink.
    pub fn signaller(&self) -> SinkSignaller {
        self.signaller.clone()
    }

    /// Subscribe to out-of-band feed events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_sender.subscribe()
    }

    async fn send(&self, cmd: FeedCommand) -> FeedResult<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| FeedError::WorkerGone)
    }

    /// Flip between playing and paused.
    pub async fn toggle_pause(&self) -> FeedResult<()> {
        self.send(FeedCommand::TogglePause).await
    }

    /// Tear down timers, feeders and files. Idempotent.
    pub async fn suspend(&self) -> FeedResult<()> {
        self.send(FeedCommand::Suspend).await
    }

    /// Restart from segment 0. No-op while running.
    pub async fn resume(&self) -> FeedResult<()> {
        self.send(FeedCommand::Resume).await
    }

    pub async fn status(&self) -> FeedResult<FeedStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(FeedCommand::Status(tx)).await?;
        rx.await.map_err(|_| FeedError::WorkerGone)
    }

    /// Whether the coordinator task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the coordinator to finish on its own (end of stream under the stop policy).
    pub async fn join(mut self) -> FeedResult<()> {
        match self.task.take() {
            Some(task) => task.await.map_err(|_| FeedError::WorkerGone),
            None => Ok(()),
        }
    }

    /// Cancel the coordinator and wait for it to release every resource.
    pub async fn shutdown(mut self) -> FeedResult<()> {
        self.cancel_token.cancel();
        match self.task.take() {
            Some(task) => task.await.map_err(|_| FeedError::WorkerGone),
            None => Ok(()),
        }
    }
}

impl Drop for FrameFeed {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                task.abort();
            }
        }
    }
}
