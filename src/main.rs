use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smokewatch::watch::log_warm_up;
use smokewatch::{
    AlertFormat, ChannelSource, ConsoleSink, CsvReplay, ReadingSource, ReplayTarget, Settings,
    StopHandle, WatchReport, Watcher, WindowMonitor,
};

#[derive(Parser, Debug)]
#[command(name = "smokewatch")]
#[command(about = "Raise alerts when smoker or food temperatures trend the wrong way")]
struct Args {
    /// CSV file of probe readings to replay
    #[arg(short, long, default_value = "smokertemps.csv")]
    file: PathBuf,

    /// Settings file (TOML) with channels, cadence and broker settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delay between replayed rows (e.g., "30s", "500ms", "0s")
    #[arg(long)]
    cadence: Option<String>,

    /// Print alerts as JSON lines, and a JSON summary on exit
    #[arg(long)]
    json: bool,

    /// Consume the configured queues from RabbitMQ instead of replaying a file
    #[cfg(feature = "amqp")]
    #[arg(short, long, conflicts_with_all = ["publish", "file"])]
    subscribe: bool,

    /// Publish the CSV rows to the configured queues, then exit
    #[cfg(feature = "amqp")]
    #[arg(short, long, conflicts_with_all = ["subscribe", "json"])]
    publish: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only alerts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("smokewatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(cadence) = args.cadence {
        settings.cadence = cadence;
        settings.validate()?;
    }

    let format = if args.json {
        AlertFormat::Json
    } else {
        AlertFormat::Text
    };

    let rt = tokio::runtime::Runtime::new()?;

    // Handle publish mode (feed a broker from the CSV)
    #[cfg(feature = "amqp")]
    if args.publish {
        return rt.block_on(run_publish(&args.file, &settings));
    }

    // Handle subscribe mode (listen on broker queues)
    #[cfg(feature = "amqp")]
    if args.subscribe {
        return rt.block_on(run_with_subscribe(&settings, format));
    }

    // Default: replay the file in-process
    rt.block_on(run_with_file(&args.file, &settings, format))
}

/// Replay a CSV file through the monitors.
async fn run_with_file(path: &Path, settings: &Settings, format: AlertFormat) -> Result<()> {
    let cadence = settings.cadence()?;
    let monitors = settings.monitors()?;
    log_warm_up(&monitors, cadence);

    let mut targets = Vec::new();
    let mut bindings: Vec<(WindowMonitor, Box<dyn ReadingSource>)> = Vec::new();
    for (channel, monitor) in settings.channels.iter().zip(monitors) {
        let (tx, source) = ChannelSource::create(&format!("replay:{}", channel.name), 16);
        targets.push(ReplayTarget::new(channel.column(), tx));
        bindings.push((monitor, Box::new(source)));
    }

    let watcher = Watcher::spawn(bindings, Arc::new(ConsoleSink::new(format)));
    let stop = watcher.stop_handle();
    spawn_interrupt_handler(stop.clone());

    let replay = CsvReplay::new(path).cadence(cadence);
    let feed = tokio::spawn(replay.run(targets, stop.subscribe()));
    info!(" [*] Ready to receive temps. To exit press CTRL+C");

    let report = watcher.join().await;
    let stats = feed
        .await?
        .with_context(|| format!("Failed to replay {}", path.display()))?;
    info!("Replayed {} rows ({} skipped)", stats.rows, stats.skipped);

    finish(report, format)
}

/// Listen on one broker queue per channel.
#[cfg(feature = "amqp")]
async fn run_with_subscribe(settings: &Settings, format: AlertFormat) -> Result<()> {
    use smokewatch::source::amqp::{connect, AmqpSource};

    let url = &settings.amqp.url;
    let connection = connect(url)
        .await
        .with_context(|| format!("Connection to RabbitMQ at {} failed. Is the server running?", url))?;

    let monitors = settings.monitors()?;
    log_warm_up(&monitors, settings.cadence()?);

    let mut bindings: Vec<(WindowMonitor, Box<dyn ReadingSource>)> = Vec::new();
    for (channel, monitor) in settings.channels.iter().zip(monitors) {
        let source = AmqpSource::open(&connection, channel.queue(), settings.amqp.purge_on_start)
            .await
            .with_context(|| format!("Failed to consume queue '{}'", channel.queue()))?;
        bindings.push((monitor, Box::new(source)));
    }

    let watcher = Watcher::spawn(bindings, Arc::new(ConsoleSink::new(format)));
    spawn_interrupt_handler(watcher.stop_handle());
    info!(" [*] Ready to receive temps. To exit press CTRL+C");

    let report = watcher.join().await;
    if let Err(e) = connection.close(200, "Goodbye").await {
        warn!("Failed to close connection: {}", e);
    }

    finish(report, format)
}

/// Replay a CSV file into the broker queues.
#[cfg(feature = "amqp")]
async fn run_publish(path: &Path, settings: &Settings) -> Result<()> {
    use smokewatch::source::amqp::{connect, AmqpPublisher};
    use tokio::sync::{mpsc, watch};

    let url = &settings.amqp.url;
    let connection = connect(url)
        .await
        .with_context(|| format!("Connection to RabbitMQ at {} failed. Is the server running?", url))?;

    let mut targets = Vec::new();
    let mut forwarders = Vec::new();
    for channel in &settings.channels {
        let publisher = AmqpPublisher::open(&connection, channel.queue()).await?;
        let (tx, mut rx) = mpsc::channel::<String>(16);
        targets.push(ReplayTarget::new(channel.column(), tx));
        forwarders.push(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                publisher.publish(&message).await?;
            }
            publisher.close().await
        }));
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("User interrupted publishing.");
            stop_tx.send_replace(true);
        }
    });

    let stats = CsvReplay::new(path)
        .cadence(settings.cadence()?)
        .run(targets, stop_rx)
        .await
        .with_context(|| format!("Failed to replay {}", path.display()))?;

    for forwarder in forwarders {
        forwarder.await??;
    }
    info!("Published {} rows ({} skipped)", stats.rows, stats.skipped);

    connection.close(200, "Goodbye").await?;
    Ok(())
}

/// Stop every consumer on Ctrl-C.
fn spawn_interrupt_handler(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("User interrupted continuous listening process.");
            stop.stop();
        }
    });
}

fn finish(report: WatchReport, format: AlertFormat) -> Result<()> {
    if format == AlertFormat::Json {
        println!("{}", report.to_json());
    }
    info!(
        "Closing connection. Goodbye. ({} alerts raised)",
        report.total_alerts()
    );

    if report.has_failures() {
        bail!("One or more channels stopped with an error");
    }
    Ok(())
}
