//! Minimal russh `Server` that hands each TCP connection to our [`ConnectionHandler`].

use std::{net::SocketAddr, sync::Arc};

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    handler::{ConnectionHandler, display_addr}, secrets::MasterSecret
};

/// Factory invoked by russh whenever a client connects.
pub(super) struct ServerManager {
    pool: SqlitePool,
    secrets: Arc<MasterSecret>,
}

impl ServerManager {
    pub(super) fn new(pool: SqlitePool, secrets: Arc<MasterSecret>) -> Self {
        Self { pool, secrets }
    }
}

impl russh::server::Server for ServerManager {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, addr: Option<SocketAddr>) -> Self::Handler {
        info!(peer = %display_addr(addr), "client connected");
        ConnectionHandler::new(addr, self.pool.clone(), self.secrets.clone())
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        warn!(?error, "server session ended with error");
    }
}
