use std::{collections::HashSet, sync::Arc};

use basalt_events::{EventKind, LogEvent, PlayerName};

mod bus;
mod commands;
mod config;
mod control;
mod extractor;
mod registry;
mod supervisor;
mod tailer;
mod telegram;

use bus::EventBus;
use config::AgentConfig;
use control::ShellControl;
use extractor::EventExtractor;
use registry::PlayerRegistry;
use supervisor::ServerSupervisor;
use tailer::{LogTailer, TailPoll};
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AgentConfig::from_env();
    tracing::info!(
        server_dir = %cfg.server_dir.display(),
        log_path = %cfg.log_path.display(),
        port = cfg.server_port,
        "basalt-agent starting"
    );

    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(PlayerRegistry::new());
    let supervisor = Arc::new(ServerSupervisor::new(
        ShellControl,
        cfg.clone(),
        bus.clone(),
    ));

    // Bus handlers run synchronously on the poll loop; outbound notifications
    // go through this channel and are drained by an async sender task. With
    // no Telegram credentials the receiver is dropped and sends are no-ops.
    let (notify_tx, notify_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    subscribe_handlers(&bus, registry.clone(), notify_tx);

    let telegram = connect_telegram(&cfg).await;
    if let Some((client, creds)) = telegram.clone() {
        let chat_id = creds.chat_id.clone();
        tokio::spawn(async move {
            let mut rx = notify_rx;
            while let Some(text) = rx.recv().await {
                if let Err(e) = client.send_message(&chat_id, &text).await {
                    tracing::warn!(error = %e, "failed to deliver notification");
                }
            }
        });
    }

    // Ensure the server process exists before tailing. A failed start is
    // reported and the loops run anyway; the operator can /start later.
    if !supervisor.is_running().await {
        tracing::info!("server not detected, attempting start");
        if let Err(e) = supervisor.start().await {
            tracing::error!(error = %e, "initial server start failed");
        }
    }

    spawn_tail_loop(cfg.clone(), bus.clone());
    spawn_reconcile_loop(cfg.clone(), supervisor.clone(), registry.clone());
    if let Some((client, creds)) = telegram {
        spawn_command_loop(client, creds, supervisor.clone(), registry.clone());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    Ok(())
}

/// Validates credentials and returns the client, or None when the
/// notification path is disabled. Core tailing/supervision runs either way.
async fn connect_telegram(
    cfg: &AgentConfig,
) -> Option<(Arc<TelegramClient>, config::TelegramCreds)> {
    let creds = match &cfg.telegram {
        Some(c) => c.clone(),
        None => {
            tracing::warn!(
                "TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, notifications disabled"
            );
            return None;
        }
    };

    let client = Arc::new(TelegramClient::new(creds.token.clone()));
    match client.get_me().await {
        Ok(info) => {
            tracing::info!(
                bot = info.first_name,
                username = info.username.as_deref().unwrap_or("<unknown>"),
                "telegram bot token validated"
            );
            Some((client, creds))
        }
        Err(e) => {
            tracing::error!(error = %e, "telegram token validation failed, notifications disabled");
            None
        }
    }
}

fn subscribe_handlers(
    bus: &EventBus,
    registry: Arc<PlayerRegistry>,
    notify_tx: tokio::sync::mpsc::UnboundedSender<String>,
) {
    {
        let registry = registry.clone();
        let tx = notify_tx.clone();
        bus.subscribe(EventKind::PlayerJoined, move |ev| {
            let LogEvent::PlayerJoined { name } = ev else {
                return Ok(());
            };
            // Duplicate joins in the log produce one registry entry and one
            // notification.
            if registry.add(name.clone()) {
                tracing::info!(player = %name, "player joined");
                let _ = tx.send(format!(
                    "🟢 <b>{}</b> joined the server",
                    telegram::escape_html(name.as_str())
                ));
            }
            Ok(())
        });
    }

    {
        let registry = registry.clone();
        let tx = notify_tx.clone();
        bus.subscribe(EventKind::PlayerLeft, move |ev| {
            let LogEvent::PlayerLeft { name } = ev else {
                return Ok(());
            };
            if registry.remove(name) {
                tracing::info!(player = %name, "player left");
                let _ = tx.send(format!(
                    "🔴 <b>{}</b> left the server",
                    telegram::escape_html(name.as_str())
                ));
            }
            Ok(())
        });
    }

    {
        let tx = notify_tx.clone();
        bus.subscribe(EventKind::ChatMessage, move |ev| {
            let LogEvent::ChatMessage { name, text } = ev else {
                return Ok(());
            };
            let _ = tx.send(format!(
                "💬 <b>{}</b>: {}",
                telegram::escape_html(name.as_str()),
                telegram::escape_html(text)
            ));
            Ok(())
        });
    }

    {
        let tx = notify_tx.clone();
        bus.subscribe(EventKind::ServerStarted, move |_| {
            let _ = tx.send("🚀 Server started".to_string());
            Ok(())
        });
    }

    {
        let tx = notify_tx;
        bus.subscribe(EventKind::ServerStopped, move |_| {
            let _ = tx.send("🛑 Server stopped".to_string());
            Ok(())
        });
    }
}

fn spawn_tail_loop(cfg: AgentConfig, bus: Arc<EventBus>) {
    tokio::spawn(async move {
        let extractor = EventExtractor::new();
        let mut tailer = LogTailer::new(&cfg.log_path);
        // Skip history: events that predate this process were already
        // delivered (or never will be), not worth replaying as notifications.
        tailer.seek_to_end().await;

        let mut tick = tokio::time::interval(cfg.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match tailer.poll().await {
                TailPoll::Lines(lines) => {
                    for line in &lines {
                        if let Some(event) = extractor.classify(line) {
                            bus.publish(&event);
                        }
                    }
                }
                TailPoll::Unavailable => {
                    // Already logged by the tailer; retry next tick.
                }
            }
        }
    });
}

fn spawn_reconcile_loop(
    cfg: AgentConfig,
    supervisor: Arc<ServerSupervisor<ShellControl>>,
    registry: Arc<PlayerRegistry>,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(cfg.reconcile_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so reconciliation starts
        // one full interval after boot.
        tick.tick().await;
        loop {
            tick.tick().await;
            let truth: HashSet<PlayerName> =
                supervisor.get_online_players().await.into_iter().collect();
            let delta = registry.reconcile(&truth);
            if !delta.is_empty() {
                tracing::info!(
                    added = ?delta.added,
                    removed = ?delta.removed,
                    "player registry reconciled against log history"
                );
            }
        }
    });
}

fn spawn_command_loop(
    client: Arc<TelegramClient>,
    creds: config::TelegramCreds,
    supervisor: Arc<ServerSupervisor<ShellControl>>,
    registry: Arc<PlayerRegistry>,
) {
    tokio::spawn(async move {
        let mut offset: i64 = 0;
        loop {
            let batch = match client.poll_updates(offset).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "command poll failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };
            offset = telegram::next_offset(offset, &batch);

            for cmd in batch {
                let from_chat = cmd.chat_id.to_string();
                if from_chat != creds.chat_id {
                    tracing::warn!(chat_id = cmd.chat_id, "ignoring command from unknown chat");
                    continue;
                }
                tracing::info!(command = %cmd.text, "handling inbound command");
                let reply = commands::handle_command(&supervisor, &registry, &cmd.text).await;
                if let Err(e) = client.send_message(&from_chat, &reply).await {
                    tracing::warn!(error = %e, "failed to send command reply");
                }
            }
        }
    });
}
