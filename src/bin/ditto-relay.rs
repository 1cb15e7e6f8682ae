use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use ditto_relay::gateway::http::{GatewayHttpState, router};
use ditto_relay::{Gateway, GatewayConfig, StaticIdentities};

/// Relay requests to whichever OpenAI-compatible backend owns the model.
#[derive(Debug, Parser)]
#[command(name = "ditto-relay", version)]
struct Args {
    /// JSON or TOML config file; defaults apply when omitted.
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,
    #[arg(long)]
    json_logs: bool,
    /// Overrides `cache_dir` from the config and `CACHE_DIR`.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }
    tracing::info!(
        backends = config.base_urls.len(),
        assistant_mode = config.assistant_mode(),
        cache_dir = %config.cache_dir.display(),
        "starting relay"
    );

    let identities = StaticIdentities::new(&config.users);
    if config.users.is_empty() {
        tracing::warn!("no users configured; every authenticated route will answer 401");
    }

    let gateway = Gateway::new(config)?;
    gateway.init().await;

    let state = GatewayHttpState::new(gateway).with_identity_resolver(identities);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "ditto-relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
