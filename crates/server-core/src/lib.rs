//! SSH bastion entry point and module wiring.
//!
//! This crate intentionally keeps the public surface small: `run_server` wires
//! up the russh configuration, while the heavy lifting lives in the
//! submodules. Each inbound connection gets one [`handler::ConnectionHandler`]
//! that resolves a connection context during the credential phase and later
//! routes channels to either the session relay or the local dispatcher.

mod authz;
mod context;
mod error;
mod handler;
mod relay;
mod secrets;
mod server_manager;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use russh::{
    MethodKind, MethodSet, keys::{
        Algorithm, PrivateKey, ssh_key::{LineEnding, rand_core::OsRng}
    }, server::{self as ssh_server, Server as _}
};
use sqlx::SqlitePool;
use tracing::info;

pub use crate::{
    context::ConnectionContext, error::{ServerError, ServerResult}, secrets::MasterSecret
};
use crate::server_manager::ServerManager;

#[derive(Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Launch the bastion SSH endpoint using the parsed CLI configuration.
///
/// This opens and migrates the state database, loads (or mints) the persisted
/// server host key, enables password and public-key auth, and defers to
/// [`ServerManager`] for per-connection state machines.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let db = state_store::server_db().await?;
    let pool = db.into_pool();
    state_store::migrate(&pool).await?;

    let secrets = Arc::new(MasterSecret::from_env()?);
    let host_key = load_or_create_host_key(&pool).await?;

    let mut server_config = ssh_server::Config {
        auth_rejection_time: Duration::from_millis(250),
        auth_rejection_time_initial: Some(Duration::from_millis(0)),
        nodelay: true,
        ..Default::default()
    };

    server_config.methods = MethodSet::empty();
    server_config.methods.push(MethodKind::Password);
    server_config.methods.push(MethodKind::PublicKey);
    server_config.keys.push(host_key);

    let mut server = ServerManager::new(pool, secrets);
    info!(
        bind = %config.bind,
        port = config.port,
        db = %state_store::display_db_path(),
        "starting gatehouse bastion endpoint"
    );

    server
        .run_on_address(Arc::new(server_config), (config.bind.as_str(), config.port))
        .await?;
    Ok(())
}

async fn load_or_create_host_key(pool: &SqlitePool) -> Result<PrivateKey> {
    const KEY_NAME: &str = "server_hostkey";
    let stored = sqlx::query_scalar::<_, String>("SELECT value FROM server_options WHERE key = ?")
        .bind(KEY_NAME)
        .fetch_optional(pool)
        .await?;

    if let Some(pem) = stored {
        let key = PrivateKey::from_openssh(&pem)?;
        info!("loaded persisted server host key");
        Ok(key)
    } else {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?;
        let pem = key.to_openssh(LineEnding::LF)?.to_string();

        sqlx::query("INSERT OR REPLACE INTO server_options (key, value) VALUES (?, ?)")
            .bind(KEY_NAME)
            .bind(pem)
            .execute(pool)
            .await?;

        info!("generated new server host key and cached it in the state database");
        Ok(key)
    }
}
