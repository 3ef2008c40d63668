/// Normalized player identity used as the key across the registry and
/// dedup logic.
///
/// NOTE: Normalization trims whitespace and strips one trailing separator
/// (Bedrock logs end join lines with `Player connected: Name, xuid: ...`).
/// Case is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PlayerName(String);

impl PlayerName {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let stripped = trimmed
            .strip_suffix(',')
            .or_else(|| trimmed.strip_suffix(':'))
            .unwrap_or(trimmed);
        Self(stripped.trim_end().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PlayerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One structured event derived from the server, either classified out of a
/// log line or fired by the supervisor on a confirmed state transition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogEvent {
    PlayerJoined { name: PlayerName },
    PlayerLeft { name: PlayerName },
    ChatMessage { name: PlayerName, text: String },
    ServerStarted,
    ServerStopped,
}

impl LogEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LogEvent::PlayerJoined { .. } => EventKind::PlayerJoined,
            LogEvent::PlayerLeft { .. } => EventKind::PlayerLeft,
            LogEvent::ChatMessage { .. } => EventKind::ChatMessage,
            LogEvent::ServerStarted => EventKind::ServerStarted,
            LogEvent::ServerStopped => EventKind::ServerStopped,
        }
    }
}

/// Field-less discriminant of [`LogEvent`], used as the bus subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    PlayerJoined,
    PlayerLeft,
    ChatMessage,
    ServerStarted,
    ServerStopped,
}

/// Liveness of the supervised server, derived on demand by probing the OS.
/// Never cached as authoritative state. Probing cannot observe transitional
/// phases, so there are exactly two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServerState {
    Stopped,
    Running,
}
