use basalt_events::ServerState;

use crate::control::ProcessControl;
use crate::registry::PlayerRegistry;
use crate::supervisor::ServerSupervisor;

/// Maps one inbound chat command onto supervisor/registry operations and
/// formats the reply. Failures become reply text, never panics or exits.
pub async fn handle_command<C: ProcessControl>(
    supervisor: &ServerSupervisor<C>,
    registry: &PlayerRegistry,
    text: &str,
) -> String {
    let text = text.trim();
    let head = text.split_whitespace().next().unwrap_or_default();
    let rest = text[head.len()..].trim();

    match head {
        "/start" => match supervisor.start().await {
            Ok(()) => "✅ Server is up.".to_string(),
            Err(e) => format!("❌ Start failed: {e}"),
        },
        "/stop" => match supervisor.stop().await {
            Ok(()) => "✅ Server stopped.".to_string(),
            Err(e) => format!("❌ Stop failed: {e}"),
        },
        "/status" => match supervisor.state().await {
            ServerState::Running => "🟢 Server is running.".to_string(),
            ServerState::Stopped => "🔴 Server is stopped.".to_string(),
        },
        "/players" => {
            let players = registry.snapshot();
            if players.is_empty() {
                "No players online.".to_string()
            } else {
                let names: Vec<&str> = players.iter().map(|p| p.as_str()).collect();
                format!("Online ({}): {}", names.len(), names.join(", "))
            }
        }
        "/say" if !rest.is_empty() => {
            match supervisor.send_command(&format!("say {rest}")).await {
                Ok(()) => "📣 Sent.".to_string(),
                Err(e) => format!("❌ Could not deliver: {e}"),
            }
        }
        "/cmd" if !rest.is_empty() => match supervisor.send_command(rest).await {
            Ok(()) => "✅ Command delivered (execution not confirmed).".to_string(),
            Err(e) => format!("❌ Could not deliver: {e}"),
        },
        _ => "Unknown command. Try /start /stop /status /players /say <text> /cmd <command>."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use basalt_events::PlayerName;

    use super::*;
    use crate::bus::EventBus;
    use crate::config::AgentConfig;
    use crate::control::{Multiplexer, Probe, Signal};

    // A control surface with fixed liveness that accepts every injection.
    struct ProbeControl {
        running: bool,
    }

    impl ProcessControl for ProbeControl {
        async fn scan_process(&self, _pattern: &str) -> Probe {
            if self.running { Probe::Yes } else { Probe::No }
        }
        async fn session_exists(&self, _mux: Multiplexer, _session: &str) -> Probe {
            Probe::No
        }
        async fn port_is_free(&self, _port: u16) -> Probe {
            if self.running { Probe::No } else { Probe::Yes }
        }
        async fn launch_session(
            &self,
            _mux: Multiplexer,
            _session: &str,
            _dir: &std::path::Path,
            _exec: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn spawn_detached(
            &self,
            _dir: &std::path::Path,
            _exec: &str,
            _log: &std::path::Path,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn inject(
            &self,
            _mux: Multiplexer,
            _session: &str,
            _text: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn signal_all(&self, _pattern: &str, _sig: Signal) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fixture(running: bool) -> (ServerSupervisor<ProbeControl>, PlayerRegistry) {
        let cfg = AgentConfig {
            server_dir: "/srv/bedrock".into(),
            log_path: "/srv/bedrock/logs.txt".into(),
            executable: "bedrock_server".to_string(),
            session: "minecraft".to_string(),
            server_port: 19132,
            poll_interval: std::time::Duration::from_secs(1),
            reconcile_interval: std::time::Duration::from_secs(60),
            settle: std::time::Duration::from_millis(10),
            stop_grace_secs: 1,
            telegram: None,
        };
        let sup = ServerSupervisor::new(ProbeControl { running }, cfg, Arc::new(EventBus::new()));
        (sup, PlayerRegistry::new())
    }

    #[tokio::test]
    async fn status_reports_running() {
        let (sup, reg) = fixture(true);
        assert_eq!(handle_command(&sup, &reg, "/status").await, "🟢 Server is running.");
    }

    #[tokio::test]
    async fn status_reports_stopped() {
        let (sup, reg) = fixture(false);
        assert_eq!(handle_command(&sup, &reg, "/status").await, "🔴 Server is stopped.");
    }

    #[tokio::test]
    async fn players_lists_sorted_names() {
        let (sup, reg) = fixture(true);
        reg.add(PlayerName::new("Bob"));
        reg.add(PlayerName::new("Alice"));
        assert_eq!(
            handle_command(&sup, &reg, "/players").await,
            "Online (2): Alice, Bob"
        );
    }

    #[tokio::test]
    async fn players_with_empty_registry() {
        let (sup, reg) = fixture(true);
        assert_eq!(handle_command(&sup, &reg, "/players").await, "No players online.");
    }

    #[tokio::test]
    async fn say_wraps_text_in_say_command() {
        let (sup, reg) = fixture(true);
        assert_eq!(handle_command(&sup, &reg, "/say hello world").await, "📣 Sent.");
    }

    #[tokio::test]
    async fn unknown_command_gets_usage_reply() {
        let (sup, reg) = fixture(true);
        let reply = handle_command(&sup, &reg, "/dance").await;
        assert!(reply.starts_with("Unknown command"));
    }

    #[tokio::test]
    async fn bare_say_is_unknown() {
        let (sup, reg) = fixture(true);
        let reply = handle_command(&sup, &reg, "/say").await;
        assert!(reply.starts_with("Unknown command"));
    }
}
