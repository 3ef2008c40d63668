use std::{collections::HashSet, io::SeekFrom, sync::Arc, time::Duration};

use anyhow::Context;
use basalt_events::{LogEvent, PlayerName, ServerState};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::bus::EventBus;
use crate::config::AgentConfig;
use crate::control::{Multiplexer, Probe, ProcessControl, Signal};
use crate::extractor::EventExtractor;

/// Log history window replayed by `get_online_players`.
const REPLAY_WINDOW_BYTES: u64 = 64 * 1024;

/// Wait after SIGTERM before re-probing.
const TERM_WAIT: Duration = Duration::from_secs(3);
/// Wait after SIGKILL before re-probing.
const KILL_WAIT: Duration = Duration::from_secs(1);

/// Definitive supervisor failures. These are terminal for the operation that
/// produced them; the caller (or operator) decides what happens next. The
/// surrounding loops never retry them automatically.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("all launch strategies failed: {0}")]
    LaunchFailed(String),
    #[error("launch command succeeded but the server did not come up within the settle period")]
    StartUnconfirmed,
    #[error("server still running after SIGKILL")]
    StopFailed,
    #[error("server is not running")]
    NotRunning,
    #[error("no command channel accepted delivery: {0}")]
    DeliveryFailed(String),
}

/// Starts, stops and commands the external server process through ordered
/// fallback strategies.
///
/// Liveness is re-derived on every call, never cached. Mutating operations
/// (`start`, `stop`, `send_command`) are serialized behind one lock; the
/// concurrent poll/reconcile/command loops all go through this instance.
pub struct ServerSupervisor<C: ProcessControl> {
    control: C,
    cfg: AgentConfig,
    bus: Arc<EventBus>,
    extractor: EventExtractor,
    ops: tokio::sync::Mutex<()>,
}

impl<C: ProcessControl> ServerSupervisor<C> {
    pub fn new(control: C, cfg: AgentConfig, bus: Arc<EventBus>) -> Self {
        Self {
            control,
            cfg,
            bus,
            extractor: EventExtractor::new(),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    /// Probes liveness through the fallback chain: process-table scan, then
    /// multiplexer sessions, then a UDP bind on the server port. The first
    /// definitive answer wins. If every probe is inconclusive this reports
    /// *running*: a duplicate start would corrupt server state, a missed
    /// restart merely delays one.
    pub async fn is_running(&self) -> bool {
        if self.control.scan_process(&self.cfg.executable).await == Probe::Yes {
            tracing::debug!("server detected via process scan");
            return true;
        }

        for mux in [Multiplexer::Screen, Multiplexer::Tmux] {
            if self.control.session_exists(mux, &self.cfg.session).await == Probe::Yes {
                tracing::debug!(?mux, "server detected via multiplexer session");
                return true;
            }
        }

        match self.control.port_is_free(self.cfg.server_port).await {
            Probe::Yes => false,
            Probe::No => {
                tracing::debug!(port = self.cfg.server_port, "server detected via port probe");
                true
            }
            Probe::Unknown => {
                tracing::warn!("all liveness probes inconclusive, assuming server is running");
                true
            }
        }
    }

    pub async fn state(&self) -> ServerState {
        if self.is_running().await {
            ServerState::Running
        } else {
            ServerState::Stopped
        }
    }

    /// Ensures the server process exists. No-op success when already running.
    /// Launch strategies in strict fallback order: detached screen session,
    /// detached tmux session, raw background spawn. A launch command
    /// succeeding is not trusted; only the post-settle probe confirms the
    /// start, and `ServerStarted` fires on that confirmation alone.
    pub async fn start(&self) -> anyhow::Result<()> {
        let _ops = self.ops.lock().await;

        if self.is_running().await {
            tracing::info!("server is already running");
            return Ok(());
        }

        let mut failures = Vec::new();
        let mut launched = false;

        for mux in [Multiplexer::Screen, Multiplexer::Tmux] {
            match self
                .control
                .launch_session(mux, &self.cfg.session, &self.cfg.server_dir, &self.cfg.executable)
                .await
            {
                Ok(()) => {
                    tracing::info!(?mux, "server launched in multiplexer session");
                    launched = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(?mux, error = %e, "launch strategy failed");
                    failures.push(format!("{mux:?}: {e}"));
                }
            }
        }

        if !launched {
            let spawn_log = self.cfg.server_dir.join("server_output.log");
            match self
                .control
                .spawn_detached(&self.cfg.server_dir, &self.cfg.executable, &spawn_log)
                .await
            {
                Ok(()) => {
                    tracing::info!("server launched as raw background process");
                    launched = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "raw spawn failed");
                    failures.push(format!("spawn: {e}"));
                }
            }
        }

        if !launched {
            return Err(SupervisorError::LaunchFailed(failures.join("; ")).into());
        }

        tokio::time::sleep(self.cfg.settle).await;

        if !self.is_running().await {
            tracing::error!("server failed to start despite successful launch command");
            return Err(SupervisorError::StartUnconfirmed.into());
        }

        tracing::info!("server start confirmed");
        self.bus.publish(&LogEvent::ServerStarted);
        Ok(())
    }

    /// Stops the server with increasing force: in-band `stop` command, then
    /// SIGTERM, then SIGKILL, each followed by a bounded wait and re-probe.
    /// The first stage whose probe reports not-running short-circuits the
    /// rest and fires exactly one `ServerStopped`.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let _ops = self.ops.lock().await;

        if !self.is_running().await {
            tracing::info!("server is not running");
            return Ok(());
        }

        match self.send_command_inner("stop").await {
            Ok(()) => {
                for _ in 0..self.cfg.stop_grace_secs {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if !self.is_running().await {
                        return self.confirm_stopped("graceful command");
                    }
                }
                tracing::warn!(
                    grace_secs = self.cfg.stop_grace_secs,
                    "server did not stop after graceful command"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "graceful stop command could not be delivered");
            }
        }

        if let Err(e) = self.control.signal_all(&self.cfg.executable, Signal::Term).await {
            tracing::warn!(error = %e, "failed to send SIGTERM");
        }
        tokio::time::sleep(TERM_WAIT).await;
        if !self.is_running().await {
            return self.confirm_stopped("SIGTERM");
        }

        tracing::warn!("server did not stop after SIGTERM, forcing");
        if let Err(e) = self.control.signal_all(&self.cfg.executable, Signal::Kill).await {
            tracing::warn!(error = %e, "failed to send SIGKILL");
        }
        tokio::time::sleep(KILL_WAIT).await;
        if !self.is_running().await {
            return self.confirm_stopped("SIGKILL");
        }

        tracing::error!("server still running after SIGKILL");
        Err(SupervisorError::StopFailed.into())
    }

    fn confirm_stopped(&self, stage: &str) -> anyhow::Result<()> {
        tracing::info!(stage, "server stop confirmed");
        self.bus.publish(&LogEvent::ServerStopped);
        Ok(())
    }

    /// Delivers a command to the server console. "Accepted" means a channel
    /// took the write; there is no acknowledgement that the server executed
    /// the command.
    pub async fn send_command(&self, text: &str) -> anyhow::Result<()> {
        let _ops = self.ops.lock().await;
        if !self.is_running().await {
            return Err(SupervisorError::NotRunning.into());
        }
        self.send_command_inner(text).await
    }

    async fn send_command_inner(&self, text: &str) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for mux in [Multiplexer::Screen, Multiplexer::Tmux] {
            match self.control.inject(mux, &self.cfg.session, text).await {
                Ok(()) => {
                    tracing::info!(?mux, command = text, "command accepted by channel");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(?mux, error = %e, "command channel refused delivery");
                    failures.push(format!("{mux:?}: {e}"));
                }
            }
        }
        Err(SupervisorError::DeliveryFailed(failures.join("; ")).into())
    }

    /// Best-effort ground truth for reconciliation: replays the recent log
    /// window through the join/leave patterns and keeps names joined but not
    /// subsequently left. Independent of the live event stream.
    pub async fn get_online_players(&self) -> Vec<PlayerName> {
        let lines = match self.read_log_tail().await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read log history for player query");
                return Vec::new();
            }
        };

        let mut online = HashSet::new();
        for line in &lines {
            match self.extractor.classify(line) {
                Some(LogEvent::PlayerJoined { name }) => {
                    online.insert(name);
                }
                Some(LogEvent::PlayerLeft { name }) => {
                    online.remove(&name);
                }
                _ => {}
            }
        }

        let mut out: Vec<PlayerName> = online.into_iter().collect();
        out.sort();
        out
    }

    async fn read_log_tail(&self) -> anyhow::Result<Vec<String>> {
        let meta = tokio::fs::metadata(&self.cfg.log_path)
            .await
            .context("stat log file")?;
        let size = meta.len();
        let start = size.saturating_sub(REPLAY_WINDOW_BYTES);

        let mut f = tokio::fs::File::open(&self.cfg.log_path)
            .await
            .context("open log file")?;
        f.seek(SeekFrom::Start(start)).await.context("seek log file")?;

        let mut buf = vec![0u8; (size - start) as usize];
        f.read_exact(&mut buf).await.context("read log file")?;

        let text = String::from_utf8_lossy(&buf);
        let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        // When the window starts mid-file the first line is usually cut.
        if start > 0 && !lines.is_empty() {
            lines.remove(0);
        }
        Ok(lines)
    }
}
