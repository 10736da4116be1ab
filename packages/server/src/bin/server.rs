//! Collaborative pixel canvas server.
//!
//! Serves the board over HTTP and WebSocket and accepts rate-limited pixel placements.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tsubu-server
//! cargo run --bin tsubu-server -- --config tsubu.toml --host 0.0.0.0 --port 3000
//! ```

use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicUsize},
};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tsubu_server::{
    config::{Config, CooldownMode},
    domain::{ActivityCooldown, BaseCooldown, Canvas, FixedCooldown, StackingPolicy},
    infrastructure::{
        FileCanvasSnapshotStore, IdentityCache, InMemoryStore, PersistenceQueue,
        WebSocketMessagePusher,
    },
    ui::{Server, console::Console, state::AppState},
    usecase::{
        AuthService, CanvasSettings, ConnectClientUseCase, DisconnectClientUseCase,
        GetCanvasUseCase, PlacePixelUseCase, RestoreOutcome, ResolveSessionUseCase,
        SaveCanvasUseCase,
    },
};
use tsubu_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

#[derive(Parser, Debug)]
#[command(name = "tsubu-server")]
#[command(about = "Collaborative pixel canvas server", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short = 'c', long, default_value = "tsubu.toml")]
    config: PathBuf,

    /// Host address to bind the server to (overrides the configuration file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port number to bind the server to (overrides the configuration file)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let palette = match config.palette() {
        Ok(palette) => palette,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    // Initialize dependencies in order:
    // 1. Canvas (restored from the snapshot file)
    // 2. Store and persistence queue
    // 3. MessagePusher and stacking policy
    // 4. UseCases
    // 5. Background tasks (periodic save, console)
    // 6. Server

    // 1. Create Canvas
    let canvas = Arc::new(Canvas::new(
        config.board.width,
        config.board.height,
        palette,
        config.board.default_color,
    ));
    let snapshots = Arc::new(FileCanvasSnapshotStore::new(
        config.board.snapshot_path.clone(),
    ));
    let save_canvas_usecase = Arc::new(SaveCanvasUseCase::new(canvas.clone(), snapshots));
    match save_canvas_usecase.restore(config.oversize_grace()).await {
        Ok(RestoreOutcome::Blank) => tracing::info!(
            "No canvas snapshot at {}, starting blank",
            config.board.snapshot_path.display()
        ),
        Ok(RestoreOutcome::Loaded { bytes }) => {
            tracing::info!("Canvas restored ({} bytes)", bytes)
        }
        Ok(RestoreOutcome::Truncated { expected, actual }) => {
            tracing::info!("Canvas restored ({} of {} bytes)", expected, actual)
        }
        Err(e) => {
            tracing::error!("Failed to restore canvas: {}", e);
            std::process::exit(1);
        }
    }

    // 2. Create Store (in-memory database) and its write queue
    let store = Arc::new(InMemoryStore::new());
    let (persistence, persistence_worker) = PersistenceQueue::spawn(store.clone());

    // 3. Create MessagePusher (WebSocket implementation) and stacking policy
    let online = Arc::new(AtomicUsize::new(0));
    let message_pusher = Arc::new(WebSocketMessagePusher::with_online_counter(online.clone()));
    let base_cooldown: Arc<dyn BaseCooldown> = match config.cooldown.mode {
        CooldownMode::Fixed => Arc::new(FixedCooldown::new(config.base_cooldown())),
        CooldownMode::Activity => Arc::new(ActivityCooldown::new(online)),
    };
    let policy = Arc::new(StackingPolicy::new(
        config.stacking.max_stacked,
        config.stacking.cooldown_multiplier,
        base_cooldown,
    ));
    let identity_cache = Arc::new(IdentityCache::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 4. Create UseCases
    let connect_client_usecase = Arc::new(ConnectClientUseCase::new(message_pusher.clone()));
    let disconnect_client_usecase =
        Arc::new(DisconnectClientUseCase::new(message_pusher.clone()));
    let resolve_session_usecase = Arc::new(ResolveSessionUseCase::new(
        store,
        identity_cache.clone(),
        policy,
        clock.clone(),
        config.auth.use_ip,
    ));
    let place_pixel_usecase = Arc::new(PlacePixelUseCase::new(
        canvas.clone(),
        message_pusher.clone(),
        persistence.clone(),
        clock.clone(),
    ));
    let get_canvas_usecase = Arc::new(GetCanvasUseCase::new(
        canvas,
        CanvasSettings {
            canvas_code: config.canvas_code.clone(),
            max_stacked: config.stacking.max_stacked,
            auth_services: config
                .auth
                .services
                .iter()
                .map(|service| AuthService {
                    id: service.id.clone(),
                    name: service.name.clone(),
                })
                .collect(),
            registration_enabled: config.auth.registration_enabled,
        },
    ));

    // 5. Start background tasks
    let shutdown = CancellationToken::new();
    let periodic_save =
        save_canvas_usecase.spawn_periodic(config.save_interval(), shutdown.clone());
    let console = Console::new(
        save_canvas_usecase.clone(),
        message_pusher.clone(),
        clock,
    )
    .spawn(shutdown.clone());

    // 6. Create and run the server
    let state = AppState {
        connect_client_usecase,
        disconnect_client_usecase,
        resolve_session_usecase,
        place_pixel_usecase,
        get_canvas_usecase,
        connection_key_mode: config.server.connection_key,
        token_cookie: config.auth.token_cookie.clone(),
        shutdown: shutdown.clone(),
    };
    let server = Server::new(state, config.server.static_dir.clone());
    let result = server.run(host, port).await;

    // Stop background tasks and regeneration timers, then save one last time
    shutdown.cancel();
    let _ = periodic_save.await;
    console.abort();
    let evicted = identity_cache.evict_all().await;
    tracing::debug!("Evicted {} active identities", evicted);
    match save_canvas_usecase.execute().await {
        Ok(bytes) => tracing::info!("Canvas saved ({} bytes)", bytes),
        Err(e) => tracing::error!("Failed to save canvas on shutdown: {}", e),
    }
    persistence.flush().await;
    persistence_worker.abort();

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    // the blocking stdin read of the console would keep the runtime alive
    std::process::exit(0);
}
