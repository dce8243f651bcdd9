mod admin;

use std::{fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use admin_ipc::{run_server, DEFAULT_SOCKET_PATH};
use anyhow::{anyhow, bail};
use clap::{Parser, ValueEnum};
use metrics::MetricsHandle;
use notifier::{DryRunSender, HttpGatewaySender, MessageSender};
use preferences::{JsonFilePreferenceStore, PreferenceStore, SubscriberBook};
use scheduler::{utc_offset_from_secs, Monitor, MonitorConfig, SchedulePolicy};
use stock_model::CategoryId;
use stock_source::{
    HttpStockSource, PushStockSource, RetryUntilNewer, StockSource, DEFAULT_RECONNECT_BACKOFF,
    DEFAULT_STOCK_URL,
};
use tokio::sync::watch;
use tokio::task;
use tracing::{error, info, warn, Level};
use uuid::Uuid;

use crate::admin::AdminContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceMode {
    /// Single GET per check.
    Oneshot,
    /// Keep polling until upstream reports newer data.
    Retry,
    /// WebSocket subscription.
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Schedule {
    PerCategory,
    Aligned,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "STOCK_API_URL", default_value = DEFAULT_STOCK_URL)]
    stock_url: String,

    #[arg(long, env = "STOCK_SOURCE_MODE", value_enum, default_value_t = SourceMode::Oneshot)]
    source_mode: SourceMode,

    #[arg(long, env = "STOCK_PUSH_URL")]
    push_url: Option<String>,

    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 10)]
    retry_attempts: u32,

    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = 30)]
    retry_delay_secs: u64,

    #[arg(long, env = "SCHEDULE_POLICY", value_enum, default_value_t = Schedule::PerCategory)]
    schedule: Schedule,

    #[arg(long, env = "ALIGN_INTERVAL_SECS", default_value_t = 300)]
    align_interval_secs: u64,

    #[arg(long, env = "ALIGN_OFFSET_SECS", default_value_t = 12)]
    align_offset_secs: u64,

    #[arg(long, env = "COOLDOWN_SECS", default_value_t = 30)]
    cooldown_secs: u64,

    /// Comma separated subset of categories to watch.
    #[arg(long, env = "CATEGORIES", value_delimiter = ',')]
    categories: Vec<CategoryId>,

    #[arg(long, env = "PREFS_PATH", default_value = "data/user_preferences.json")]
    prefs_path: String,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,

    /// Chat bridge base URL. Without it messages are only logged.
    #[arg(long, env = "GATEWAY_URL")]
    gateway_url: Option<String>,

    #[arg(long, env = "NOTIFY_UTC_OFFSET_HOURS", default_value_t = 7, allow_negative_numbers = true)]
    utc_offset_hours: i32,
}

fn log_startup(args: &Args, run_id: &str) {
    info!(url = %args.stock_url, mode = ?args.source_mode, "stock source configured");
    info!(policy = ?args.schedule, cooldown_secs = args.cooldown_secs, "schedule configured");
    info!(path = %args.prefs_path, "preference store configured");
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    match &args.gateway_url {
        Some(url) => info!(%url, "delivery gateway configured"),
        None => warn!("no delivery gateway configured, running dry"),
    }
    info!(%run_id, "run initialized");
}

fn validate_url(url: &str, schemes: &[&str]) -> anyhow::Result<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        bail!("url `{url}` is missing a scheme");
    };
    if !schemes.contains(&scheme) {
        bail!("url `{url}` must use one of: {}", schemes.join(", "));
    }
    if rest.trim_matches('/').is_empty() {
        bail!("url `{url}` is missing a host");
    }
    Ok(())
}

fn validate_source_url(url: &str) -> anyhow::Result<()> {
    validate_url(url, &["http", "https"])
}

fn validate_push_url(url: &str) -> anyhow::Result<()> {
    validate_url(url, &["ws", "wss"])
}

fn ensure_prefs_parent_dir(path: &str) -> anyhow::Result<()> {
    if path.trim().is_empty() {
        bail!("preference path must not be empty");
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn monitor_config(args: &Args) -> anyhow::Result<MonitorConfig> {
    let utc_offset_secs = args
        .utc_offset_hours
        .checked_mul(3600)
        .filter(|secs| secs.abs() < 24 * 3600)
        .ok_or_else(|| anyhow!("utc offset {}h is out of range", args.utc_offset_hours))?;

    let policy = match args.schedule {
        Schedule::PerCategory => SchedulePolicy::PerCategory,
        Schedule::Aligned => {
            if args.align_interval_secs == 0 {
                bail!("align interval must be positive");
            }
            SchedulePolicy::WallClock {
                interval: Duration::from_secs(args.align_interval_secs),
                offset: Duration::from_secs(args.align_offset_secs),
            }
        }
    };

    let mut config = MonitorConfig {
        policy,
        default_cooldown: Duration::from_secs(args.cooldown_secs),
        utc_offset: utc_offset_from_secs(utc_offset_secs),
        ..MonitorConfig::default()
    };
    if !args.categories.is_empty() {
        let mut categories = args.categories.clone();
        categories.sort();
        categories.dedup();
        config.categories = categories;
    }
    Ok(config)
}

fn build_source(args: &Args) -> anyhow::Result<Arc<dyn StockSource>> {
    let source: Arc<dyn StockSource> = match args.source_mode {
        SourceMode::Oneshot => Arc::new(HttpStockSource::new(args.stock_url.as_str())?),
        SourceMode::Retry => Arc::new(RetryUntilNewer::new(
            HttpStockSource::new(args.stock_url.as_str())?,
            args.retry_attempts,
            Duration::from_secs(args.retry_delay_secs),
        )),
        SourceMode::Push => {
            let url = args
                .push_url
                .as_deref()
                .ok_or_else(|| anyhow!("push mode needs --push-url / STOCK_PUSH_URL"))?;
            validate_push_url(url)?;
            Arc::new(PushStockSource::connect(url, DEFAULT_RECONNECT_BACKOFF))
        }
    };
    Ok(source)
}

fn build_sender(args: &Args) -> anyhow::Result<Arc<dyn MessageSender>> {
    Ok(match &args.gateway_url {
        Some(url) => {
            validate_source_url(url)?;
            Arc::new(HttpGatewaySender::new(url)?)
        }
        None => Arc::new(DryRunSender),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_source_url(&args.stock_url)?;
    ensure_prefs_parent_dir(&args.prefs_path)?;
    info!(
        source = %args.stock_url,
        socket = %args.admin_socket,
        "booting stockd"
    );

    let run_id = Uuid::new_v4().to_string();
    log_startup(&args, &run_id);

    let store: Arc<dyn PreferenceStore> = Arc::new(JsonFilePreferenceStore::new(&args.prefs_path));
    let book = SubscriberBook::open(store).await?;
    info!(subscribers = book.snapshot().len(), "preferences loaded");

    let config = monitor_config(&args)?;
    let offset = config.utc_offset;
    let source = build_source(&args)?;
    let sender = build_sender(&args)?;
    let metrics = MetricsHandle::new()?;
    let monitor = Monitor::new(
        Arc::clone(&source),
        sender,
        book.clone(),
        metrics.clone(),
        config,
    );

    let admin = AdminContext {
        run_id: run_id.clone(),
        monitor: monitor.clone(),
        book,
        source,
        offset,
    };
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        let handler = move |req| admin.clone().handle(req);
        if let Err(err) = run_server(&socket_path, handler).await {
            error!(error = ?err, "admin ipc server failed");
        }
    });

    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics.serve(metrics_addr).await {
            error!(error = ?err, "metrics server error");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = {
        let monitor = monitor.clone();
        task::spawn(async move { monitor.run(shutdown_rx).await })
    };

    info!(
        run_id = %run_id,
        prefs = %args.prefs_path,
        admin_socket = %args.admin_socket,
        metrics_addr = %args.metrics_addr,
        "ready"
    );

    tokio::signal::ctrl_c().await?;
    info!(run_id = %run_id, "shutdown requested");
    let _ = shutdown_tx.send(true);
    monitor_task.await?;
    Ok(())
}
