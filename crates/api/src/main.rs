use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waifu_api::config::ServerConfig;
use waifu_api::router::build_app_router;
use waifu_api::{state, ws};
use waifu_catalog::api::JikanApi;
use waifu_catalog::cache::RedisCache;
use waifu_catalog::client::CatalogClient;
use waifu_db::PgStore;
use waifu_engine::GameService;
use waifu_events::EventBus;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "waifu_api=debug,waifu_engine=debug,waifu_catalog=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_rolls = config.game.quota.max_rolls,
        admins = config.game.admin_user_ids.len(),
        "Loaded server configuration",
    );

    // --- Database ---
    let pool = waifu_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    waifu_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    waifu_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Catalog ---
    let cache = RedisCache::connect(&config.redis_url)
        .await
        .expect("Failed to connect to Redis");
    tracing::info!("Catalog cache connected");

    let catalog = CatalogClient::new(
        Arc::new(JikanApi::new(config.jikan_base_url.clone())),
        Arc::new(cache),
        config.cache_ttl(),
    );

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    tracing::info!("Event bus created");

    // --- Game service ---
    let game_shutdown = CancellationToken::new();
    let game = GameService::with_shutdown(
        Arc::new(PgStore::new(pool)),
        Arc::new(catalog),
        config.game.clone(),
        Arc::clone(&event_bus),
        game_shutdown.clone(),
    );

    game.check_connectivity()
        .await
        .expect("Store or catalog cache unreachable");
    tracing::info!("Game service ready");

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // Spawn event forwarder (streams game events to every frontend).
    let forwarder = ws::EventForwarder::new(Arc::clone(&ws_manager));
    let forwarder_handle = tokio::spawn(forwarder.run(event_bus.subscribe()));
    tracing::info!("Event forwarder started");

    // --- App state ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState {
        game: game.clone(),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!(
        pending_timers = game.pending_tasks(),
        "Server stopped accepting connections, cleaning up"
    );

    // Pending claims, trades, packs and gifts are ephemeral and die here.
    game_shutdown.cancel();
    game.shutdown();
    drop(game);
    tracing::info!("Game timers cancelled");

    // Dropping the last bus handle closes the channel and ends the forwarder.
    drop(event_bus);
    let _ = tokio::time::timeout(shutdown_timeout, forwarder_handle).await;
    tracing::info!("Event forwarder stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
