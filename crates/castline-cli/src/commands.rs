//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::{LiveAction, LiveArgs};
use anyhow::{anyhow, bail, Context};
use castline_core::transport::ws::WsConnector;
use castline_core::{
    manifest, sorted_for_display, ClientSettings, EventBus, LiveControl, LiveSessionRequest,
    QualityLevel, StreamStatus, StreamTransport, Timings, ViewCounter,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Open the realtime socket described by the environment
async fn connect(settings: &ClientSettings) -> anyhow::Result<StreamTransport> {
    let connector = WsConnector::parse(&settings.socket_url)?;
    let transport = StreamTransport::new(Arc::new(connector));
    transport.set_auth_token(settings.auth_token.clone());

    let mut errors = transport.errors();
    transport.connect().await;
    if !transport.is_connected() {
        let reason = errors
            .try_recv()
            .unwrap_or_else(|_| "connection refused".to_string());
        bail!("Could not connect to {}: {}", settings.socket_url, reason);
    }
    info!(connection_id = ?transport.connection_id(), "Connected");
    Ok(transport)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveOutcome {
    stream_id: String,
    status: StreamStatus,
    confirmed: bool,
}

/// Start or end a broadcast and wait for the server's answer
pub async fn live(action: LiveAction, format: OutputFormat) -> anyhow::Result<()> {
    let settings = ClientSettings::from_env().context("reading CASTLINE_* settings")?;
    let (args, status) = match action {
        LiveAction::Start(args) => (args, StreamStatus::Live),
        LiveAction::End(args) => (args, StreamStatus::Ended),
    };
    let request = build_request(&settings, args, status);

    let transport = connect(&settings).await?;
    let control = LiveControl::new(transport.clone(), &Timings::default());
    let result = match status {
        StreamStatus::Live => control.start_stream(&request).await,
        StreamStatus::Ended => control.end_stream(&request).await,
    };
    transport.disconnect();

    result.map_err(|e| anyhow!(e.user_message()))?;

    let outcome = LiveOutcome {
        stream_id: request.stream_id,
        status,
        confirmed: true,
    };
    output::print(format, &outcome, |o| match o.status {
        StreamStatus::Live => format!("Broadcast {} is live", o.stream_id),
        StreamStatus::Ended => format!("Broadcast {} ended", o.stream_id),
    })
}

fn build_request(settings: &ClientSettings, args: LiveArgs, status: StreamStatus) -> LiveSessionRequest {
    let stream_url = args
        .stream_url
        .unwrap_or_else(|| settings.stream_url(&args.stream_id));
    LiveSessionRequest {
        stream_id: args.stream_id,
        title: args.title,
        description: args.description,
        stream_url,
        status,
        thumbnail_url: args.thumbnail_url,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewCount {
    video_id: u64,
    view_count: u64,
}

/// Ask the server for a video's view count
pub async fn views(video_id: u64, timeout_secs: u64, format: OutputFormat) -> anyhow::Result<()> {
    let settings = ClientSettings::from_env().context("reading CASTLINE_* settings")?;
    let transport = connect(&settings).await?;

    let counter = ViewCounter::attach(transport.clone(), video_id, &Timings::default(), EventBus::default());
    let mut count = counter.subscribe_count();
    let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), count.wait_for(Option::is_some)).await;
    let view_count = match waited {
        Ok(Ok(value)) => *value,
        Ok(Err(_)) => None,
        Err(_) => bail!("No view count for video {video_id} within {timeout_secs}s"),
    };
    drop(counter);
    transport.disconnect();

    let view_count = view_count.ok_or_else(|| anyhow!("Connection closed before the count arrived"))?;
    output::print(format, &ViewCount { video_id, view_count }, |v| {
        format!("Video {}: {} views", v.video_id, v.view_count)
    })
}

#[derive(Serialize)]
struct LadderEntry {
    label: String,
    index: usize,
    width: u32,
    height: u32,
    bitrate_bps: u64,
}

/// Print the quality menu a player would show for a master playlist
pub async fn ladder(source: &str, format: OutputFormat) -> anyhow::Result<()> {
    let levels = manifest::load_ladder(source).await?;
    let entries: Vec<LadderEntry> = sorted_for_display(&levels)
        .iter()
        .map(|level: &QualityLevel| LadderEntry {
            label: level.display_name(),
            index: level.index,
            width: level.width,
            height: level.height,
            bitrate_bps: level.bitrate_bps,
        })
        .collect();

    output::print(format, &entries, |entries| {
        let mut text = format!("Quality levels ({}):\n  Auto", entries.len());
        for entry in entries {
            text.push_str(&format!(
                "\n  {:<10} index {:<3} {}x{} @ {} kbps",
                entry.label,
                entry.index,
                entry.width,
                entry.height,
                entry.bitrate_bps / 1000
            ));
        }
        text
    })
}
