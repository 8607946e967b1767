// ABOUTME: Drives one interactive SSH session: dial, authenticate, PTY, shell I/O, teardown
// ABOUTME: Raw mode, the resize forwarder and the stdin pump are scoped to the session and always released

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::{Environment, SshSettings};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::ssh::auth::{AuthChainBuilder, ServerAttempt, authenticate_chain};
use crate::ssh::parser::HostRecord;
use crate::ssh::prompt::Prompter;
use crate::terminal::{
    self, ResizeForwarder, ShutdownSignals, StdinPump, TerminalGuard, WindowSize,
};

const TERMINAL_SPEED: u32 = 14400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Dialing,
    Authenticated,
    PtyRequested,
    ShellRunning,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Dialing => "dialing",
            SessionState::Authenticated => "authenticated",
            SessionState::PtyRequested => "pty-requested",
            SessionState::ShellRunning => "shell-running",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub port: u16,
    pub user: String,
}

impl Target {
    pub fn resolve(host: &HostRecord, fallback_user: Option<&str>) -> Result<Self> {
        let port = host
            .port
            .parse::<u16>()
            .map_err(|_| Error::Dial(format!("invalid port '{}' for host {}", host.port, host.name)))?;

        let user = host
            .user
            .as_deref()
            .or(fallback_user)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            address: host.address().to_string(),
            port,
            user,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Parameters of the remote pseudo-terminal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: WindowSize,
    pub modes: Vec<(Pty, u32)>,
}

impl PtyRequest {
    pub fn new(term: Option<&str>, default_term: &str, size: Option<WindowSize>) -> Self {
        Self {
            term: term.unwrap_or(default_term).to_string(),
            size: WindowSize::or_fallback(size),
            modes: vec![
                (Pty::ECHO, 1),
                (Pty::TTY_OP_ISPEED, TERMINAL_SPEED),
                (Pty::TTY_OP_OSPEED, TERMINAL_SPEED),
            ],
        }
    }
}

/// Accepts every server key. No known_hosts verification is done.
struct SessionHandler;

impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SessionManager {
    settings: SshSettings,
    env: Environment,
    auth: AuthChainBuilder,
    prompter: Arc<dyn Prompter>,
    diag: Diagnostics,
}

impl SessionManager {
    pub fn new(
        settings: SshSettings,
        env: Environment,
        prompter: Arc<dyn Prompter>,
        diag: Diagnostics,
    ) -> Self {
        let auth = AuthChainBuilder::new(
            PathBuf::from(&settings.key_dir),
            env.agent_socket.clone(),
            diag,
        );
        Self {
            settings,
            env,
            auth,
            prompter,
            diag,
        }
    }

    fn transition(&self, to: SessionState) {
        self.diag.debug(&format!("Session state -> {to}"));
    }

    /// Runs the session to completion. Returns once the remote shell has exited and
    /// the local terminal has been restored.
    pub async fn run(&self, host: &HostRecord) -> Result<()> {
        self.transition(SessionState::Disconnected);
        let target = Target::resolve(host, self.env.user.as_deref())?;

        self.transition(SessionState::Dialing);
        self.diag.debug(&format!("Connecting to {}@{}", target.user, target));
        let mut handle = self.dial(&target).await?;

        self.authenticate(&mut handle, host, &target).await?;
        self.transition(SessionState::Authenticated);
        self.diag.info(&format!("Authenticated as {} on {}", target.user, target));

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::SessionRuntime(format!("failed to create session: {e}")))?;

        let result = self.interactive(channel).await;

        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        self.transition(SessionState::Closed);

        result
    }

    async fn dial(&self, target: &Target) -> Result<Handle<SessionHandler>> {
        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        client::connect(
            Arc::new(config),
            (target.address.clone(), target.port),
            SessionHandler,
        )
        .await
        .map_err(|e| Error::Dial(format!("{target}: {e}")))
    }

    async fn authenticate(
        &self,
        handle: &mut Handle<SessionHandler>,
        host: &HostRecord,
        target: &Target,
    ) -> Result<()> {
        let chain = self.auth.build(host);
        let mut attempt = ServerAttempt {
            handle,
            user: &target.user,
            prompter: self.prompter.as_ref(),
            diag: self.diag,
        };

        authenticate_chain(&chain, &mut attempt, &target.user, &target.to_string(), self.diag)
            .await?;
        Ok(())
    }

    async fn interactive(&self, mut channel: Channel<Msg>) -> Result<()> {
        // Subscribed before raw mode so a signal during setup cannot skip the restore
        let mut shutdown = ShutdownSignals::subscribe()
            .map_err(|e| Error::SessionRuntime(format!("failed to watch signals: {e}")))?;
        let guard = TerminalGuard::acquire(self.diag)
            .map_err(|e| Error::Pty(format!("failed to set raw terminal: {e}")))?;

        let request = PtyRequest::new(
            self.env.term.as_deref(),
            &self.settings.default_term,
            terminal::window_size(),
        );
        self.diag.debug(&format!(
            "Requesting PTY {} {}x{}",
            request.term, request.size.cols, request.size.rows
        ));

        channel
            .request_pty(
                true,
                &request.term,
                request.size.cols,
                request.size.rows,
                0,
                0,
                &request.modes,
            )
            .await
            .map_err(|e| Error::Pty(format!("failed to request PTY: {e}")))?;
        let granted = tokio::select! {
            reply = wait_for_reply(&mut channel) => reply?,
            reason = shutdown.recv() => return Err(Error::SessionRuntime(reason.to_string())),
        };
        if !granted {
            return Err(Error::Pty("server refused the PTY request".to_string()));
        }
        self.transition(SessionState::PtyRequested);

        let notifications = terminal::sigwinch()
            .map_err(|e| Error::SessionRuntime(format!("failed to watch window size: {e}")))?;
        let (size_tx, size_rx) = mpsc::unbounded_channel();
        let forwarder = ResizeForwarder::spawn(notifications, terminal::window_size, size_tx);
        let (stdin_pump, stdin_rx) = StdinPump::spawn();

        channel
            .request_shell(true)
            .await
            .map_err(|e| Error::SessionRuntime(format!("failed to start shell: {e}")))?;
        self.transition(SessionState::ShellRunning);

        let outcome = self
            .pump(&mut channel, &mut shutdown, stdin_rx, size_rx)
            .await;

        forwarder.stop().await;
        drop(stdin_pump);
        drop(guard);

        outcome
    }

    /// Moves bytes between the local stdio and the channel until the remote side closes.
    async fn pump(
        &self,
        channel: &mut Channel<Msg>,
        shutdown: &mut ShutdownSignals,
        mut stdin_rx: mpsc::Receiver<Vec<u8>>,
        mut size_rx: mpsc::UnboundedReceiver<WindowSize>,
    ) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();
        let mut stdin_open = true;
        let mut shell_started = false;
        let mut exit_status: Option<u32> = None;
        let mut exit_signal: Option<String> = None;

        loop {
            tokio::select! {
                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            stdout.write_all(&data).await.map_err(local_io)?;
                            stdout.flush().await.map_err(local_io)?;
                        }
                        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                            stderr.write_all(&data).await.map_err(local_io)?;
                            stderr.flush().await.map_err(local_io)?;
                        }
                        Some(ChannelMsg::Success) => shell_started = true,
                        Some(ChannelMsg::Failure) if !shell_started => {
                            return Err(Error::SessionRuntime("server refused to start a shell".to_string()));
                        }
                        Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                            self.diag.debug(&format!("Remote exit status {status}"));
                            exit_status = Some(status);
                        }
                        Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                            exit_signal = Some(format!("{signal_name:?}"));
                        }
                        Some(ChannelMsg::Close) | None => break,
                        Some(_) => {}
                    }
                }

                data = stdin_rx.recv(), if stdin_open => {
                    match data {
                        Some(bytes) => channel.data(&bytes[..]).await?,
                        None => {
                            stdin_open = false;
                            channel.eof().await?;
                        }
                    }
                }

                Some(size) = size_rx.recv() => {
                    self.diag.debug(&format!("Window changed to {}x{}", size.cols, size.rows));
                    if let Err(e) = channel.window_change(size.cols, size.rows, 0, 0).await {
                        self.diag.debug(&format!("Failed to forward window size: {e}"));
                    }
                }

                reason = shutdown.recv() => {
                    return Err(Error::SessionRuntime(reason.to_string()));
                }
            }
        }

        session_outcome(exit_status, exit_signal)
    }
}

fn local_io(e: std::io::Error) -> Error {
    Error::SessionRuntime(format!("local terminal I/O failed: {e}"))
}

/// Waits for the server's answer to a want-reply channel request.
async fn wait_for_reply(channel: &mut Channel<Msg>) -> Result<bool> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(true),
            Some(ChannelMsg::Failure) => return Ok(false),
            Some(ChannelMsg::Close) | Some(ChannelMsg::Eof) | None => {
                return Err(Error::SessionRuntime("channel closed during setup".to_string()));
            }
            Some(_) => {}
        }
    }
}

/// A clean close with status 0 is success; anything else is reported to the caller.
fn session_outcome(exit_status: Option<u32>, exit_signal: Option<String>) -> Result<()> {
    if let Some(signal) = exit_signal {
        return Err(Error::SessionRuntime(format!("remote shell killed by signal {signal}")));
    }

    match exit_status {
        Some(0) => Ok(()),
        Some(status) => Err(Error::RemoteExit(status)),
        None => Err(Error::SessionRuntime(
            "remote shell exited without exit status".to_string(),
        )),
    }
}
