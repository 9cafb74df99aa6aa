//! Lock daemon: the single serialized processing point.
//!
//! Architecture: channel-based actor. One loop owns all mutable lock
//! state ([`state::DaemonState`]) and consumes, in arrival order:
//! connection commands, sampler events, deadline ticks, the screen-on
//! settle timer, and inputs fed back by the validation bridge and the
//! effect executor. Effects never run inside the loop; they are queued
//! to the executor task (see [`effects`]).

mod connection;
mod effects;
mod gateway;
mod handler;
mod state;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use connection::{DaemonCommand, DisconnectNotice};
use gateway::PresenterHub;
use handler::Followup;
use state::{ConnectionId, DaemonState};

use crate::config::LockConfig;
use crate::ipc::protocol::Message;
use crate::lock::{LockInput, LockSessionManager, SharedSettings, ValidationBridge};
use crate::model::{Effect, ForegroundEvent, ScreenPower};
use crate::sampler::x11::X11ForegroundSource;
use crate::sampler::{
    ForegroundSampler, ForegroundSource, ForegroundStream, NullSource, sleep_until_opt,
};

/// Daemon startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("daemon already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid shell pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the daemon until SIGTERM or SIGINT.
///
/// - Socket at `$XDG_RUNTIME_DIR/applockd/daemon.sock` (dir mode 0700)
/// - Stale socket detection and cleanup
/// - All lock state in-memory only (lost on exit)
pub async fn run(config: LockConfig) -> Result<(), DaemonError> {
    let socket_path = resolve_socket_path()?;
    let listener = bind_socket(&socket_path).await?;

    tracing::info!(path = %socket_path.display(), "daemon listening");

    let shutdown = CancellationToken::new();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
        trigger.cancel();
    });

    let result = serve(
        listener,
        config,
        open_source(),
        Arc::new(SharedSettings::default()),
        shutdown,
    )
    .await;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("daemon stopped");
    result
}

/// Foreground source for this session. Without a display every tick is
/// empty and nothing is ever locked.
fn open_source() -> Arc<dyn ForegroundSource> {
    match X11ForegroundSource::connect() {
        Ok(source) => Arc::new(source),
        Err(e) => {
            tracing::warn!(error = %e, "no foreground source, sampling will report nothing");
            Arc::new(NullSource)
        }
    }
}

/// Channels and handles the loop needs besides [`DaemonState`].
struct Runtime {
    cmd_tx: mpsc::UnboundedSender<DaemonCommand>,
    disconnect_tx: mpsc::UnboundedSender<DisconnectNotice>,
    push_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    hub: Arc<PresenterHub>,
    effect_tx: mpsc::UnboundedSender<Effect>,
    sampler: ForegroundSampler,
    stream: Option<ForegroundStream>,
    settle_delay: Duration,
    /// Screen-on settle deadline; sampling resumes when it passes.
    resume_at: Option<Instant>,
    shutdown: CancellationToken,
}

/// The daemon loop, on an already-bound listener.
async fn serve(
    listener: UnixListener,
    config: LockConfig,
    source: Arc<dyn ForegroundSource>,
    settings: Arc<SharedSettings>,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<DaemonCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();
    // Validation bridge output and effect-executor feedback.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<LockInput>();
    let (effect_tx, effect_rx) = mpsc::unbounded_channel::<Effect>();

    let hub = Arc::new(PresenterHub::new());
    let executor =
        effects::spawn_executor(effect_rx, hub.clone(), hub.clone(), input_tx.clone());

    let manager = LockSessionManager::new(&config, settings.clone(), settings.clone());
    let mut state = DaemonState::new(manager, ValidationBridge::new(input_tx), settings.clone());

    let sampler = ForegroundSampler::new(&config, source, settings)?;
    let mut rt = Runtime {
        cmd_tx,
        disconnect_tx,
        push_senders: HashMap::new(),
        hub,
        effect_tx,
        stream: None,
        sampler,
        settle_delay: config.settle_delay,
        resume_at: None,
        shutdown: shutdown.clone(),
    };
    rt.start_sampling(&mut state);

    loop {
        let deadline = state.manager.next_deadline();
        tokio::select! {
            _ = shutdown.cancelled() => break,

            // -- New connection --
            result = listener.accept() => match result {
                Ok((stream, _addr)) => rt.accept_connection(stream),
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },

            // -- Command from connection task --
            Some(cmd) = cmd_rx.recv() => {
                let (response, followup) = handler::handle_message(
                    &mut state,
                    cmd.request,
                    cmd.connection_id,
                    Instant::now(),
                );
                // Attach before answering so a presenter never misses a
                // present issued right after its handshake.
                rt.apply(&mut state, cmd.connection_id, followup);
                let _ = cmd.response_tx.send(response);
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                rt.push_senders.remove(&conn_id);
                rt.hub.detach(conn_id);
                state.remove_connection(conn_id);
                tracing::debug!(?conn_id, "connection cleaned up");
            }

            // -- Foreground change --
            event = next_foreground(&mut rt.stream) => match event {
                Some(event) => {
                    let effects = state.manager.handle(LockInput::Foreground(event), Instant::now());
                    rt.dispatch(effects);
                }
                None => {
                    tracing::warn!("foreground sampling ended unexpectedly");
                    rt.stream = None;
                    state.sampling = false;
                }
            },

            // -- Session expiry / cooldown end --
            _ = sleep_until_opt(deadline) => {
                let effects = state.manager.tick(Instant::now());
                rt.dispatch(effects);
            }

            // -- Screen-on settle delay elapsed --
            _ = sleep_until_opt(rt.resume_at) => {
                rt.resume_at = None;
                rt.start_sampling(&mut state);
            }

            // -- Validation results, presentation failures --
            Some(input) = input_rx.recv() => {
                let effects = state.manager.handle(input, Instant::now());
                rt.dispatch(effects);
            }
        }
    }

    // Stops the sampler and the connection tasks' push channels.
    drop(rt);
    let _ = executor.await;
    Ok(())
}

/// Next sampler event, or pending forever while sampling is stopped.
async fn next_foreground(stream: &mut Option<ForegroundStream>) -> Option<ForegroundEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl Runtime {
    fn accept_connection(&mut self, stream: UnixStream) {
        let conn_id = ConnectionId::new();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        self.push_senders.insert(conn_id, push_tx);

        connection::spawn_connection(
            stream,
            conn_id,
            self.cmd_tx.clone(),
            push_rx,
            self.disconnect_tx.clone(),
        );

        tracing::debug!(?conn_id, "accepted connection");
    }

    fn apply(&mut self, state: &mut DaemonState, conn_id: ConnectionId, followup: Followup) {
        if followup.attach_presenter
            && let Some(tx) = self.push_senders.get(&conn_id)
        {
            self.hub.attach(conn_id, tx.clone());
            // Queued behind the hello_ack by the connection task.
            if let Some(session) = &followup.replay {
                tracing::debug!(?conn_id, session = %session.id, "replaying present to new presenter");
                let _ = tx.send(gateway::present_frame(session.id, &session.target_app, session.kind));
            }
        }
        self.dispatch(followup.effects);
        match followup.power {
            Some(ScreenPower::Off) => {
                self.resume_at = None;
                if self.stream.take().is_some() {
                    tracing::info!("screen off, sampling stopped");
                }
                state.sampling = false;
            }
            Some(ScreenPower::On) => {
                // The lock state was reset, so the sampler restarts from
                // now with fresh filter state even if it never stopped.
                if self.stream.take().is_some() {
                    tracing::debug!("screen on while sampling, restarting after settle");
                }
                state.sampling = false;
                self.resume_at = Some(Instant::now() + self.settle_delay);
            }
            None => {}
        }
    }

    /// Start sampling unless a sampler is already running.
    fn start_sampling(&mut self, state: &mut DaemonState) {
        if self.stream.is_none() {
            self.stream = Some(self.sampler.observe(&self.shutdown));
        }
        state.sampling = true;
    }

    fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            if self.effect_tx.send(effect).is_err() {
                tracing::warn!("effect executor gone, effect dropped");
            }
        }
    }
}

// -- Socket setup --

/// Resolve the daemon socket path from `$XDG_RUNTIME_DIR`.
pub fn resolve_socket_path() -> Result<PathBuf, DaemonError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").map_err(|_| DaemonError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("applockd")
        .join("daemon.sock"))
}

/// Create the socket directory and bind the Unix listener.
///
/// On EADDRINUSE, a successful connect means another daemon is running;
/// a failed one means the socket is stale and is replaced.
async fn bind_socket(path: &std::path::Path) -> Result<UnixListener, DaemonError> {
    let bind_failed = |source| DaemonError::BindFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        let mkdir_failed = |source| DaemonError::MkdirFailed {
            path: parent.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(parent).map_err(mkdir_failed)?;
        // Enforced even if the directory already existed.
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
            .map_err(mkdir_failed)?;
    }

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
            }
            tracing::info!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path).map_err(bind_failed)?;
            UnixListener::bind(path).map_err(bind_failed)
        }
        Err(e) => Err(bind_failed(e)),
    }
}
