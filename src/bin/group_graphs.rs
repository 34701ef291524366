use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use group_graphs::{
    MessageEvents,
    actors::{
        buffer::{PointBuffer, PointSink},
        probe::UnreadProbe,
        scheduler::RoundHandle,
    },
    aggregator::Aggregator,
    config::{Config, read_config_file},
    storage::{StorageBackend, influx::InfluxBackend, memory::MemoryBackend},
    upstream::VkApi,
    webhook::{WebhookConfig, spawn_webhook_server},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value = "config.json")]
    file: String,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![("group_graphs", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = read_config_file(&args.file)?;

    let level = config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::DEBUG);
    init(level);
    trace!("started with args: {args:?}");

    let backend = create_backend(&config).await?;
    let buffer = PointBuffer::spawn(backend, &config.buffer);
    let sink: Arc<dyn PointSink> = Arc::new(buffer.clone());

    let aggregator = Arc::new(Aggregator::new(sink.clone()));
    let messages = RoundHandle::spawn("messages", config.schedule.messages(), aggregator.clone())?;

    let api = VkApi::with_token(&config.vk.token, &config.vk.api_version)?;
    let probe = UnreadProbe::new(Arc::new(api), sink, config.vk.group_id.clone());
    let unread = RoundHandle::spawn("unread", config.schedule.unread(), Arc::new(probe))?;

    let events: Arc<dyn MessageEvents> = aggregator.clone();
    let addr = spawn_webhook_server(WebhookConfig::from_vk(config.bind, &config.vk), events)
        .await
        .context("failed to start callback server")?;
    info!("accepting callbacks on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    let handles = [&messages, &unread];
    let results = join_all(handles.iter().map(|handle| handle.shutdown())).await;
    for (handle, result) in handles.iter().zip(results) {
        if let Err(e) = result {
            error!("could not stop {} rounds: {e}", handle.name);
        }
    }

    // Counts of the unfinished window still go out
    let flushed = aggregator.flush();
    debug!("flushed {flushed} pending message points");

    buffer.shutdown().await;

    Ok(())
}

async fn create_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let Some(influx) = &config.influxdb else {
        warn!("no influxdb configured, keeping points in memory");
        return Ok(Arc::new(MemoryBackend::new()));
    };

    let backend = InfluxBackend::new(influx.clone()).context("invalid influxdb configuration")?;

    match backend.health_check().await {
        Ok(status) if status.healthy => debug!("influxdb healthy: {}", status.message),
        Ok(status) => warn!("influxdb unhealthy: {}", status.message),
        Err(e) => warn!("influxdb health check failed: {e}"),
    }

    Ok(Arc::new(backend))
}
