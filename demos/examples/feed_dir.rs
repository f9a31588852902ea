use std::time::Duration;

use demos::{DownstreamConfig, SimulatedDownstream};
use frame_feed::{
    ExhaustionPolicy, FeedEvent, FeedResult, FeedSettings, FrameFeed, SegmentLayout,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, metadata::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> FeedResult<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::default().add_directive(LevelFilter::INFO.into()))
        .with_line_number(true)
        .with_file(true)
        .init();

    // Args:
    // 1) Directory holding raw_{audio,video}_frames_<n>.bin and their .txt index files (default: .)
    // 2) Optional "stop" to end after the last segment instead of looping
    let root = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let policy = match std::env::args().nth(2).as_deref() {
        Some("stop") => ExhaustionPolicy::Stop,
        _ => ExhaustionPolicy::Loop,
    };

    info!("frame feed demo starting");
    info!("  Directory: {}", root);
    info!("  At end: {:?} (press Ctrl+C to quit)", policy);

    let downstream = SimulatedDownstream::new(DownstreamConfig::default());
    let renderer = downstream.spawn_renderer();

    let settings = FeedSettings::new()
        .exhaustion_policy(policy)
        .segment_end_tolerance(Duration::from_millis(100))
        .position_log_interval(Duration::from_secs(1));
    let feed = FrameFeed::spawn(
        SegmentLayout::new(root),
        settings,
        downstream.clone(),
        downstream.oracle(),
    )?;
    let mut events = feed.subscribe();

    let watch = async {
        loop {
            match events.recv().await {
                Ok(FeedEvent::EndOfStream) => {
                    info!("end of stream reached");
                    return;
                }
                Ok(event) => info!("event: {:?}", event),
                Err(RecvError::Lagged(n)) => warn!("missed {} events", n),
                Err(RecvError::Closed) => return,
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = watch => {}
    }

    info!("rendered {} frames in the last pass", downstream.rendered());
    feed.shutdown().await?;
    let _ = renderer.await;
    info!("done");
    Ok(())
}
