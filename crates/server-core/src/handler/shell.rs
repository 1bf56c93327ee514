//! Local shell dispatcher for non-relay connection kinds.
//!
//! Health probes answer `OK` and hang up, invite redemptions only show the
//! message accumulated during authentication, and self-shell connections get
//! a small line-oriented administrative shell.

use gate_types::ConnectionKind;
use russh::{ChannelId, server::Session};
use tracing::info;

use super::{ConnectionHandler, display_addr};
use crate::context::ConnectionContext;

const PROMPT: &str = "gatehouse> ";

/// Line-editing state for the admin shell.
pub(crate) struct ShellState {
    buffer: Vec<u8>,
}

/// Commands the admin shell understands; anything else is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AdminCommand {
    Whoami,
    Hosts,
    Sessions,
    Help,
}

impl AdminCommand {
    fn parse(line: &str) -> Option<Self> {
        match line {
            "whoami" => Some(AdminCommand::Whoami),
            "hosts" => Some(AdminCommand::Hosts),
            "sessions" => Some(AdminCommand::Sessions),
            "help" => Some(AdminCommand::Help),
            _ => None,
        }
    }
}

impl ConnectionHandler {
    pub(super) async fn run_local_dispatch(
        &mut self,
        session: &mut Session,
        channel: ChannelId,
        ctx: &ConnectionContext,
        command: Option<String>,
    ) -> Result<(), russh::Error> {
        let kind = ctx.kind();
        if kind != ConnectionKind::HealthCheck {
            info!(
                peer = %display_addr(self.peer_addr),
                connection = %self.connection_id,
                caller = %ctx.user.name,
                kind = kind.as_str(),
                command = command.as_deref().unwrap_or(""),
                "new connection(shell)"
            );
        }

        // Deferred failures from the credential phase surface here, then the
        // session ends with a non-zero status no matter the kind.
        if let Some(err) = &ctx.error {
            self.send_line(session, channel, &format!("error: {err}"))?;
            return self.handle_exit(session, channel, 1);
        }

        if let Some(message) = &ctx.message {
            self.send_text(session, channel, message)?;
        }

        match kind {
            ConnectionKind::HealthCheck => {
                self.send_line(session, channel, "OK")?;
                self.handle_exit(session, channel, 0)
            }
            ConnectionKind::Invite => {
                // Message was printed above; nothing further to do.
                self.handle_exit(session, channel, 0)
            }
            ConnectionKind::Shell => match command {
                // Exec mode: run the one command and hang up.
                Some(cmd) => {
                    let status = self.run_admin_command(&cmd, session, channel).await?;
                    self.handle_exit(session, channel, status)
                }
                None => self.enter_admin_shell(session, channel).await,
            },
            ConnectionKind::Bastion => unreachable!("bastion connections never reach the local dispatcher"),
        }
    }

    async fn enter_admin_shell(&mut self, session: &mut Session, channel: ChannelId) -> Result<(), russh::Error> {
        self.send_line(session, channel, "gatehouse admin shell; type 'help' for commands.")?;
        self.send_bytes(session, channel, PROMPT.as_bytes())?;
        self.shell = Some(ShellState { buffer: Vec::new() });
        Ok(())
    }

    pub(super) async fn handle_shell_input(&mut self, data: &[u8], session: &mut Session, channel: ChannelId) -> Result<(), russh::Error> {
        for &byte in data {
            match byte {
                // Ctrl+C / Ctrl+D: hang up.
                0x03 => {
                    self.send_bytes(session, channel, b"^C\r\n")?;
                    return self.handle_exit(session, channel, 0);
                }
                0x04 => {
                    self.send_bytes(session, channel, b"\r\n")?;
                    return self.handle_exit(session, channel, 0);
                }
                // Backspace/delete.
                0x7f | 0x08 => {
                    let popped = self.shell.as_mut().and_then(|s| s.buffer.pop());
                    if popped.is_some() {
                        self.send_bytes(session, channel, b"\x08 \x08")?;
                    }
                }
                // Ctrl+U: clear the line.
                0x15 => {
                    if let Some(state) = self.shell.as_mut() {
                        let count = state.buffer.len();
                        state.buffer.clear();
                        for _ in 0..count {
                            self.send_bytes(session, channel, b"\x08 \x08")?;
                        }
                    }
                }
                b'\r' | b'\n' => {
                    let line = self
                        .shell
                        .as_mut()
                        .map(|s| String::from_utf8_lossy(&std::mem::take(&mut s.buffer)).trim().to_string())
                        .unwrap_or_default();
                    self.send_bytes(session, channel, b"\r\n")?;

                    if matches!(line.as_str(), "exit" | "quit") {
                        self.send_line(session, channel, "Bye!")?;
                        return self.handle_exit(session, channel, 0);
                    }
                    if !line.is_empty() {
                        self.run_admin_command(&line, session, channel).await?;
                    }
                    self.send_bytes(session, channel, PROMPT.as_bytes())?;
                }
                // Printable input: buffer and echo.
                0x20..=0x7e => {
                    if let Some(state) = self.shell.as_mut() {
                        state.buffer.push(byte);
                        self.send_bytes(session, channel, &[byte])?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Run one admin command; returns the exit status exec mode reports.
    async fn run_admin_command(&mut self, line: &str, session: &mut Session, channel: ChannelId) -> Result<u32, russh::Error> {
        let Some(command) = AdminCommand::parse(line) else {
            self.send_line(session, channel, &format!("unknown command {line:?}; try 'help'"))?;
            return Ok(1);
        };

        match command {
            AdminCommand::Whoami => {
                if let Some(ctx) = self.context.as_ref() {
                    self.send_line(session, channel, &format!("{} <{}> (id {})", ctx.user.name, ctx.user.email, ctx.user.id))?;
                }
            }
            AdminCommand::Hosts => match state_store::list_host_names(&self.pool).await {
                Ok(hosts) if hosts.is_empty() => self.send_line(session, channel, "no hosts configured")?,
                Ok(hosts) => {
                    for (name, addr) in hosts {
                        self.send_line(session, channel, &format!("{name}\t{addr}"))?;
                    }
                }
                Err(err) => self.send_line(session, channel, &format!("error: {err}"))?,
            },
            AdminCommand::Sessions => match state_store::list_active_sessions(&self.pool).await {
                Ok(active) if active.is_empty() => self.send_line(session, channel, "no active sessions")?,
                Ok(active) => {
                    for record in active {
                        self.send_line(
                            session,
                            channel,
                            &format!("session {}: user {} -> host {}", record.id, record.user_id, record.host_id),
                        )?;
                    }
                }
                Err(err) => self.send_line(session, channel, &format!("error: {err}"))?,
            },
            AdminCommand::Help => {
                self.send_line(session, channel, "commands: whoami, hosts, sessions, help, exit")?;
            }
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::AdminCommand;

    #[test]
    fn known_commands_parse() {
        assert_eq!(AdminCommand::parse("whoami"), Some(AdminCommand::Whoami));
        assert_eq!(AdminCommand::parse("hosts"), Some(AdminCommand::Hosts));
        assert_eq!(AdminCommand::parse("sessions"), Some(AdminCommand::Sessions));
        assert_eq!(AdminCommand::parse("help"), Some(AdminCommand::Help));
    }

    #[test]
    fn unknown_commands_do_not_parse() {
        // Exec mode reports exit status 1 for these.
        assert_eq!(AdminCommand::parse("bogus"), None);
        assert_eq!(AdminCommand::parse(""), None);
        assert_eq!(AdminCommand::parse("Whoami"), None);
        assert_eq!(AdminCommand::parse("hosts "), None);
    }
}
