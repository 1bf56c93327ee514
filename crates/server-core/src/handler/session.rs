//! Channel dispatch: relay vs. local session behavior.

use gate_types::ConnectionKind;
use russh::{ChannelId, Pty, server::Session};
use tracing::{info, warn};

use super::{ConnectionHandler, display_addr};
use crate::{context::ConnectionContext, relay};

impl ConnectionHandler {
    pub(super) async fn handle_shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), russh::Error> {
        session.channel_success(channel)?;
        self.channel = Some(channel);
        self.dispatch(channel, session, None).await
    }

    pub(super) async fn handle_exec_request(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), russh::Error> {
        session.channel_success(channel)?;
        self.channel = Some(channel);
        let command = String::from_utf8_lossy(data).trim().to_string();
        let command = (!command.is_empty()).then_some(command);
        self.dispatch(channel, session, command).await
    }

    /// Route the channel according to the connection kind resolved during the
    /// credential phase. No re-authentication happens here.
    async fn dispatch(&mut self, channel: ChannelId, session: &mut Session, command: Option<String>) -> Result<(), russh::Error> {
        let Some(ctx) = self.context.clone() else {
            // russh only reaches channel requests after auth, so this is a
            // programming error rather than an access decision.
            warn!(peer = %display_addr(self.peer_addr), "channel request without connection context");
            return self.handle_exit(session, channel, 1);
        };

        match ctx.kind() {
            ConnectionKind::Bastion => self.start_relay(session, channel, &ctx).await,
            _ => self.run_local_dispatch(session, channel, &ctx, command).await,
        }
    }

    /// Relay entry: resolve host, authorize, audit, bridge.
    async fn start_relay(&mut self, session: &mut Session, channel: ChannelId, ctx: &ConnectionContext) -> Result<(), russh::Error> {
        // A caller that never resolved gets its deferred error here; no
        // channel capability beyond the message is ever granted.
        if let Some(err) = &ctx.error {
            self.send_line(session, channel, &format!("error: {err}"))?;
            return self.handle_exit(session, channel, 1);
        }

        info!(
            peer = %display_addr(self.peer_addr),
            connection = %self.connection_id,
            caller = %ctx.user.name,
            host = %ctx.input_username,
            "new connection(bastion)"
        );

        let host = match state_store::fetch_host_by_name(&self.pool, &ctx.input_username).await {
            Ok(Some(host)) => host,
            Ok(None) => {
                self.send_line(session, channel, &format!("error: host {:?} not found", ctx.input_username))?;
                return self.handle_exit(session, channel, 1);
            }
            Err(err) => {
                self.send_line(session, channel, &format!("error: {err}"))?;
                return self.handle_exit(session, channel, 1);
            }
        };

        // Authorization runs before any audit record or outbound byte.
        if let Err(err) = crate::authz::check_access(&self.pool, &ctx.user, &host).await {
            warn!(
                connection = %self.connection_id,
                caller = %ctx.user.name,
                host = %host.name,
                error = %err,
                "bastion access refused"
            );
            self.send_line(session, channel, &format!("error: {err}"))?;
            return self.handle_exit(session, channel, 1);
        }

        // Audit record exists before the first relayed byte so in-progress
        // sessions are observable.
        let session_id = match state_store::create_session(&self.pool, ctx.user.id, host.id).await {
            Ok(id) => id,
            Err(err) => {
                self.send_line(session, channel, &format!("error: {err}"))?;
                return self.handle_exit(session, channel, 1);
            }
        };

        let initial_size = self.pty_size.unwrap_or((80, 24));
        let bridge = relay::start_bridge(
            session.handle(),
            channel,
            self.pool.clone(),
            self.secrets.clone(),
            host.clone(),
            session_id,
            initial_size,
            self.size_updates.subscribe(),
        )
        .await;

        match bridge {
            Ok(handle) => {
                self.relay = Some(handle);
                self.session_id = Some(session_id);
                Ok(())
            }
            Err(err) => {
                // The bridge never started; the audit record still needs its
                // terminal state.
                let msg = err.to_string();
                if let Err(db_err) = state_store::close_session(&self.pool, session_id, &msg).await {
                    warn!(session_id, error = %db_err, "failed to close session record");
                }
                self.send_line(session, channel, &format!("error: {msg}"))?;
                self.handle_exit(session, channel, 1)
            }
        }
    }

    /// Send the closing sequence and emit disconnect logs. Never leaves the
    /// caller's channel half-open.
    pub(super) fn handle_exit(&mut self, session: &mut Session, channel: ChannelId, status: u32) -> Result<(), russh::Error> {
        self.shell = None;
        session.exit_status_request(channel, status)?;
        session.eof(channel)?;
        session.close(channel)?;
        self.channel = None;
        self.log_disconnect("session ended");
        Ok(())
    }

    pub(super) async fn handle_data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), russh::Error> {
        if Some(channel) != self.channel {
            return Ok(());
        }

        if let Some(relay) = &self.relay {
            relay.send(data.to_vec());
            return Ok(());
        }

        if self.shell.is_some() {
            return self.handle_shell_input(data, session, channel).await;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) async fn handle_pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), russh::Error> {
        session.channel_success(channel)?;
        let size = (col_width.max(1) as u16, row_height.max(1) as u16);
        self.pty_size = Some(size);
        let _ = self.size_updates.send(size);
        Ok(())
    }

    pub(super) async fn handle_window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        session: &mut Session,
    ) -> Result<(), russh::Error> {
        session.channel_success(channel)?;
        let size = (col_width.max(1) as u16, row_height.max(1) as u16);
        self.pty_size = Some(size);
        let _ = self.size_updates.send(size);
        Ok(())
    }

    pub(super) async fn handle_channel_eof(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), russh::Error> {
        if Some(channel) == self.channel {
            // Dropping the handle closes its input stream; the relay loop
            // notices and tears down the outbound side.
            self.relay = None;
        }
        Ok(())
    }

    pub(super) async fn handle_channel_close(&mut self, channel: ChannelId, _session: &mut Session) -> Result<(), russh::Error> {
        if Some(channel) == self.channel {
            self.relay = None;
            self.channel = None;
            self.shell = None;
            self.log_disconnect("channel closed");
        }
        Ok(())
    }
}
