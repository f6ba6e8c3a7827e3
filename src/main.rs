use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use price_sentinel::app::{self, NotifierKind, StoreBackend};
use price_sentinel::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Streaming price anomaly monitor with rate-limited SMS alerts")]
struct Args {
    /// Path to config file (optional)
    #[arg(long)]
    config: Option<String>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Rolling window size per source
    #[arg(long)]
    window_size: Option<usize>,

    /// Alert cooldown per source in seconds
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Topic observations are published to
    #[arg(long, env = "SENTINEL_TOPIC")]
    topic: Option<String>,

    /// Transport backend: memory or redis-streams
    #[arg(long, env = "SENTINEL_TRANSPORT")]
    transport: Option<String>,

    /// Broker address for the redis-streams transport
    #[arg(long, env = "SENTINEL_BROKER_URL")]
    broker_url: Option<String>,

    /// Number of transport partitions
    #[arg(long)]
    partitions: Option<usize>,

    /// Redis address for the suppression store
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Keep cooldowns in memory instead of Redis
    #[arg(long)]
    memory_store: bool,

    /// Log alerts instead of sending SMS
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "TWILIO_ACCOUNT_SID", hide_env_values = true)]
    twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    twilio_auth_token: Option<String>,

    #[arg(long, env = "TWILIO_FROM_PHONE")]
    twilio_from_phone: Option<String>,

    #[arg(long, env = "TWILIO_TO_PHONE")]
    twilio_to_phone: Option<String>,

    /// Price sources to poll (comma-separated)
    #[arg(long)]
    sources: Option<String>,

    /// Do not start the built-in fetchers (needs an external transport)
    #[arg(long)]
    no_fetchers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Priority: CLI args / env > config file > defaults
    let mut cfg = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(window_size) = args.window_size {
        cfg.detection.window_size = window_size;
    }
    if let Some(cooldown_secs) = args.cooldown_secs {
        cfg.alerts.cooldown_secs = cooldown_secs;
    }
    if let Some(topic) = args.topic {
        cfg.transport.topic = topic;
    }
    if let Some(transport) = args.transport {
        cfg.transport.backend = transport;
    }
    if let Some(broker_url) = args.broker_url {
        cfg.transport.broker_url = broker_url;
    }
    if let Some(partitions) = args.partitions {
        cfg.transport.partitions = partitions;
    }
    if let Some(redis_url) = args.redis_url {
        cfg.store.url = redis_url;
    }
    if let Some(sid) = args.twilio_account_sid {
        cfg.twilio.account_sid = sid;
    }
    if let Some(token) = args.twilio_auth_token {
        cfg.twilio.auth_token = token;
    }
    if let Some(from) = args.twilio_from_phone {
        cfg.twilio.from_phone = from;
    }
    if let Some(to) = args.twilio_to_phone {
        cfg.twilio.to_phone = to;
    }
    if let Some(sources) = args.sources {
        cfg.fetchers.sources = sources.split(',').map(|s| s.trim().to_string()).collect();
    }
    if args.no_fetchers {
        cfg.fetchers.enabled = false;
    }

    let mut app_cfg = app::AppCfg::from_config(cfg)?;
    if args.memory_store {
        app_cfg.store_backend = StoreBackend::Memory;
    }
    if args.dry_run {
        app_cfg.notifier = NotifierKind::Log;
    }

    app::run(app_cfg).await
}
