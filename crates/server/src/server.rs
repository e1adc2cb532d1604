use tokio::net::TcpListener;

use contactlink_engine::Engine;
use contactlink_storage::SqliteStorage;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Contact reconciliation server backed by a SQLite file.
pub struct ContactServer {
    config: ServerConfig,
}

impl ContactServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the database and build the router (useful for testing).
    pub fn router(&self) -> ServerResult<axum::Router> {
        let storage = SqliteStorage::open(&self.config.database_path)?;
        let engine = Engine::with_config(storage, self.config.engine_config());
        Ok(build_router(AppState::new(
            engine,
            self.config.include_secondary_details,
        )))
    }

    /// Start serving requests until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router()?;
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            database = %self.config.database_path,
            "contact server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
