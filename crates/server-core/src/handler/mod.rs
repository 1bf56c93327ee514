//! SSH handler implementation that drives per-connection state.
//!
//! One handler exists per inbound TCP connection. The credential callbacks
//! populate the [`ConnectionContext`]; channel requests then route to either
//! the session relay controller (bastion kind) or the local dispatcher.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use russh::{ChannelId, CryptoVec, server::Session};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{context::ConnectionContext, relay::RelayHandle, secrets::MasterSecret};

mod auth;
mod session;
mod shell;

pub(crate) use shell::ShellState;

/// Tracks the lifecycle of a single SSH connection: credential resolution,
/// channel dispatch, relay plumbing, and the admin shell.
pub(crate) struct ConnectionHandler {
    pub(crate) pool: SqlitePool,
    pub(crate) secrets: Arc<MasterSecret>,
    pub(crate) peer_addr: Option<SocketAddr>,
    /// UUIDv7 used to correlate log lines for this connection.
    pub(crate) connection_id: String,
    /// Created once during the credential phase; read-only afterwards.
    pub(crate) context: Option<ConnectionContext>,
    pub(crate) channel: Option<ChannelId>,
    pub(crate) relay: Option<RelayHandle>,
    /// Audit record id while a relay session is active.
    pub(crate) session_id: Option<i64>,
    /// Line-editing state while the admin shell is active.
    pub(crate) shell: Option<ShellState>,
    pub(crate) pty_size: Option<(u16, u16)>,
    pub(crate) size_updates: watch::Sender<(u16, u16)>,
    pub(crate) connected_at: Instant,
    pub(crate) closed: bool,
}

impl ConnectionHandler {
    pub(crate) fn new(peer_addr: Option<SocketAddr>, pool: SqlitePool, secrets: Arc<MasterSecret>) -> Self {
        let (size_updates, _) = watch::channel((80, 24));
        Self {
            pool,
            secrets,
            peer_addr,
            connection_id: uuid::Uuid::now_v7().to_string(),
            context: None,
            channel: None,
            relay: None,
            session_id: None,
            shell: None,
            pty_size: None,
            size_updates,
            connected_at: Instant::now(),
            closed: false,
        }
    }

    pub(crate) fn send_bytes(&self, session: &mut Session, channel: ChannelId, bytes: &[u8]) -> Result<(), russh::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut payload = CryptoVec::new();
        payload.extend(bytes);
        session.data(channel, payload)
    }

    pub(crate) fn send_line(&self, session: &mut Session, channel: ChannelId, line: &str) -> Result<(), russh::Error> {
        let mut payload = CryptoVec::new();
        payload.extend(line.as_bytes());
        payload.extend(b"\r\n");
        session.data(channel, payload)
    }

    /// Write pre-formatted text, translating bare newlines for raw channels.
    pub(crate) fn send_text(&self, session: &mut Session, channel: ChannelId, text: &str) -> Result<(), russh::Error> {
        self.send_bytes(session, channel, text.replace('\n', "\r\n").as_bytes())
    }

    pub(crate) fn log_disconnect(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;

        let user = self
            .context
            .as_ref()
            .filter(|c| c.user.is_resolved())
            .map(|c| c.user.name.clone())
            .unwrap_or_else(|| "<unauthenticated>".to_string());
        info!(
            peer = %display_addr(self.peer_addr),
            connection = %self.connection_id,
            user = %user,
            duration = ?self.connected_at.elapsed(),
            reason,
            "client disconnected",
        );
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if !self.closed {
            // Handle abrupt SSH disconnects (no channel_close callback).
            self.log_disconnect("connection dropped");
        }
    }
}

impl russh::server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn channel_open_session(
        &mut self,
        channel: russh::Channel<russh::server::Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channel = Some(channel.id());
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: russh::Channel<russh::server::Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        // Only session channels are supported; port forwarding is out of scope.
        warn!(
            peer = %display_addr(self.peer_addr),
            target = %format!("{host_to_connect}:{port_to_connect}"),
            "rejecting channel: unsupported channel type"
        );
        Ok(false)
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<russh::server::Auth, Self::Error> {
        self.handle_auth_password(user, password).await
    }

    async fn auth_publickey(&mut self, user: &str, public_key: &russh::keys::PublicKey) -> Result<russh::server::Auth, Self::Error> {
        self.handle_auth_publickey(user, public_key).await
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        self.handle_shell_request(channel, session).await
    }

    async fn exec_request(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        self.handle_exec_request(channel, data, session).await
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        self.handle_data(channel, data, session).await
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.handle_pty_request(channel, term, col_width, row_height, pix_width, pix_height, modes, session)
            .await
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.handle_window_change_request(channel, col_width, row_height, pix_width, pix_height, session)
            .await
    }

    async fn channel_eof(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        self.handle_channel_eof(channel, session).await
    }

    async fn channel_close(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        self.handle_channel_close(channel, session).await
    }
}

/// Display helper used for tracing; keeps logging concise when the socket address is unavailable.
pub(crate) fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string()).unwrap_or_else(|| "<unknown>".into())
}
