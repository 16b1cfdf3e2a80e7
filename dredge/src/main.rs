use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dredge::api::{ApiServer, AppState};
use dredge::chat::{ChatSession, ChatSessionConfig, WebSocketConnector};
use dredge::config::AppConfig;
use dredge::credentials::{TokenManager, TwitchTokenExchanger};
use dredge::discovery::{HelixStreamSource, LiveSetDiscovery};
use dredge::ingest::{AlertMatcher, IngestService};
use dredge::notification::{FanoutAlertSink, LogAlertSink, TelegramAlertSink};
use dredge::pubsub::{Envelope, PubSub};
use dredge::storage::{self, MessageRepository, SqliteMessageRepository};
use dredge::utils::http_client::build_client;
use dredge::{logging, panic_hook};

/// How long background tasks get to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "DREDGE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Emit logs as JSON (overrides the config file)
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if args.json_logs {
        config.log.json = true;
    }

    let _log_guard = logging::init(&config.log)?;
    panic_hook::install();

    info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting"
    );

    let pool = storage::init_pool(&config.database_url)
        .await
        .context("failed to open database")?;
    storage::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    let repository: Arc<dyn MessageRepository> =
        Arc::new(SqliteMessageRepository::new(pool.clone()));

    let http = build_client(concat!("dredge/", env!("CARGO_PKG_VERSION")))?;

    let exchanger = Arc::new(TwitchTokenExchanger::new(
        http.clone(),
        &config.twitch.client_id,
        &config.twitch.client_secret,
    ));
    let tokens = Arc::new(TokenManager::new(exchanger, &config.twitch.refresh_token));
    tokens
        .initialize()
        .await
        .context("initial token exchange failed")?;

    let bus = Arc::new(PubSub::<Envelope>::new());

    let matcher = AlertMatcher::from_config(&config.alert)?;
    info!(selectors = matcher.len(), "Alert selectors compiled");

    let mut alerts = FanoutAlertSink::new().with(Arc::new(LogAlertSink));
    if let Some(telegram) = config.telegram.clone().filter(|t| !t.token.is_empty()) {
        info!("Telegram alerts enabled");
        alerts = alerts.with(Arc::new(TelegramAlertSink::new(http.clone(), telegram)));
    }

    let ingest = Arc::new(IngestService::new(
        repository,
        bus.clone(),
        matcher,
        Arc::new(alerts),
    ));

    let chat = ChatSession::new(
        Arc::new(WebSocketConnector::default()),
        tokens.clone(),
        ChatSessionConfig::new(&config.twitch.username),
    );
    chat.set_listener(ingest);
    for channel in &config.alert.permanent_channels {
        chat.join_channel(channel);
    }
    chat.connect().await.context("failed to connect to chat")?;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    {
        let tokens = tokens.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            tokens
                .run_refresh_loop(cancel, dredge::credentials::DEFAULT_REFRESH_INTERVAL)
                .await
        });
    }

    {
        let chat = chat.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { chat.run_refresh_loop(cancel).await });
    }

    if config.discovery.enabled {
        let source = HelixStreamSource::new(http.clone(), tokens.clone(), &config.twitch.client_id)
            .with_game_id(config.twitch.game_id.clone());
        let discovery = LiveSetDiscovery::new(
            Arc::new(source),
            Arc::new(chat.clone()),
            config.discovery.clone(),
        )
        .with_permanent_channels(&config.alert.permanent_channels);
        let cancel = cancel.clone();
        tasks.spawn(async move { discovery.run_fetch_loop(cancel).await });
    } else {
        warn!("Live-set discovery disabled, only permanent channels are joined");
    }

    {
        let server = ApiServer::new(
            config.listen_addr.clone(),
            AppState::new(bus.clone(), cancel.clone()).with_chat(chat.clone()),
        );
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "API server failed");
                cancel.cancel();
            }
        });
    }

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = cancel.cancelled() => warn!("Shutting down after fatal task error"),
    }

    cancel.cancel();
    chat.clear_listener();
    chat.disconnect();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Background task failed");
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!("Background tasks did not stop within {:?}", SHUTDOWN_GRACE);
        tasks.abort_all();
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
