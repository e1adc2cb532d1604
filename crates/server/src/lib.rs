//! HTTP server for contact identity reconciliation.
//!
//! Exposes `POST /identify` over a SQLite-backed reconciliation engine.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use router::build_router;
pub use server::ContactServer;
