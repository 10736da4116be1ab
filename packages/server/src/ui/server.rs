//! Server execution logic.

use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{
    handler::{board_data, health_check, info, whoami, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Pixel canvas server
///
/// Serves the WebSocket endpoint, the canvas HTTP API and the static client files.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state, "public");
/// server.run("127.0.0.1".to_string(), 4567).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
    /// 静的ファイル（クライアント）のディレクトリ
    static_dir: PathBuf,
}

impl Server {
    /// Create a new Server instance
    ///
    /// # Arguments
    ///
    /// * `state` - Usecases and settings shared by every handler
    /// * `static_dir` - Directory served for every unmatched path
    pub fn new(state: AppState, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(state),
            static_dir: static_dir.into(),
        }
    }

    /// Define handlers
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/info", get(info))
            .route("/boarddata", get(board_data))
            .route("/whoami", get(whoami))
            .route("/api/health", get(health_check))
            .fallback_service(ServeDir::new(&self.static_dir))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the pixel canvas server until Ctrl+C or SIGTERM
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 4567)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        // Start the server
        tracing::info!(
            "Pixel canvas server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// Shutdown also cancels every open connection so that graceful shutdown
    /// does not wait on idle WebSockets.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let cancel = self.state.shutdown.clone();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            cancel.cancel();
        })
        .await
    }
}
