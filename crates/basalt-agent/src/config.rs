use std::{path::PathBuf, time::Duration};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_RECONCILE_INTERVAL_SEC: u64 = 300;
const DEFAULT_SETTLE_MS: u64 = 5000;
const DEFAULT_STOP_GRACE_SEC: u64 = 10;
const DEFAULT_SERVER_PORT: u16 = 19132;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn poll_interval() -> Duration {
    Duration::from_millis(
        env_u64("BASALT_POLL_INTERVAL_MS")
            .map(|v| v.clamp(100, 60_000))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
    )
}

pub(crate) fn reconcile_interval() -> Duration {
    Duration::from_secs(
        env_u64("BASALT_RECONCILE_INTERVAL_SEC")
            .map(|v| v.clamp(30, 24 * 60 * 60))
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SEC),
    )
}

pub(crate) fn settle_period() -> Duration {
    Duration::from_millis(
        env_u64("BASALT_SETTLE_MS")
            .map(|v| v.clamp(500, 10 * 60 * 1000))
            .unwrap_or(DEFAULT_SETTLE_MS),
    )
}

pub(crate) fn stop_grace_secs() -> u64 {
    env_u64("BASALT_STOP_GRACE_SEC")
        .map(|v| v.clamp(1, 300))
        .unwrap_or(DEFAULT_STOP_GRACE_SEC)
}

fn server_dir() -> PathBuf {
    let raw = env_str("BASALT_SERVER_DIR").unwrap_or_else(|| "./server".to_string());
    let p = PathBuf::from(raw);
    let abs = if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    };

    // Best-effort canonicalization: don't fail if the directory doesn't exist yet.
    std::fs::canonicalize(&abs).unwrap_or(abs)
}

/// Telegram credentials. Absence disables only the notification/command path;
/// tailing and supervision keep running.
#[derive(Debug, Clone)]
pub struct TelegramCreds {
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory the server executable runs in.
    pub server_dir: PathBuf,
    /// Server log file the tailer follows.
    pub log_path: PathBuf,
    /// Executable name, also the process-table scan pattern.
    pub executable: String,
    /// Multiplexer session name used for launch and command injection.
    pub session: String,
    /// UDP port the server listens on (bind probe target).
    pub server_port: u16,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub settle: Duration,
    pub stop_grace_secs: u64,
    pub telegram: Option<TelegramCreds>,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let server_dir = server_dir();
        let log_path = env_str("BASALT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| server_dir.join("logs.txt"));
        let executable =
            env_str("BASALT_SERVER_EXECUTABLE").unwrap_or_else(|| "bedrock_server".to_string());
        let session = env_str("BASALT_SESSION_NAME").unwrap_or_else(|| "minecraft".to_string());
        let server_port = env_u64("BASALT_SERVER_PORT")
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v >= 1024)
            .unwrap_or(DEFAULT_SERVER_PORT);

        let telegram = match (env_str("TELEGRAM_BOT_TOKEN"), env_str("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramCreds { token, chat_id }),
            _ => None,
        };

        Self {
            server_dir,
            log_path,
            executable,
            session,
            server_port,
            poll_interval: poll_interval(),
            reconcile_interval: reconcile_interval(),
            settle: settle_period(),
            stop_grace_secs: stop_grace_secs(),
            telegram,
        }
    }
}
