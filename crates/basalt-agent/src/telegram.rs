use anyhow::Context;

const API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT_SECS: u64 = 30;

/// One inbound textual command, tagged with the chat it arrived from so the
/// reply can be routed back. `update_id` is the monotonic cursor source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, serde::Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, serde::Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, serde::Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BotInfo {
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Thin Telegram Bot API client: the notification sink and command source.
/// The core never inspects transport details beyond success/failure.
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: API_BASE.to_string(),
            token: token.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    /// Validates the bot token at startup. Failure disables only the
    /// notification/command path.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        let resp = self
            .http
            .get(self.url("getMe"))
            .send()
            .await
            .context("getMe request")?;
        let env: ApiEnvelope<BotInfo> = resp.json().await.context("getMe response body")?;
        if !env.ok {
            anyhow::bail!(
                "getMe rejected: {}",
                env.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        env.result.context("getMe returned no result")
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(self.url("sendMessage"))
            .form(&[
                ("chat_id", chat_id),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await
            .context("sendMessage request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("sendMessage failed: {status}: {body}");
        }
        Ok(())
    }

    /// Long-polls `getUpdates` from `offset`. Telegram drops every update
    /// below the offset, so acknowledging via [`next_offset`] guarantees no
    /// command is redelivered.
    pub async fn poll_updates(&self, offset: i64) -> anyhow::Result<Vec<InboundCommand>> {
        let resp = self
            .http
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_TIMEOUT_SECS.to_string()),
            ])
            .timeout(std::time::Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 10))
            .send()
            .await
            .context("getUpdates request")?;

        let env: ApiEnvelope<Vec<Update>> =
            resp.json().await.context("getUpdates response body")?;
        if !env.ok {
            anyhow::bail!(
                "getUpdates rejected: {}",
                env.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        Ok(parse_commands(env.result.unwrap_or_default()))
    }
}

fn parse_commands(updates: Vec<Update>) -> Vec<InboundCommand> {
    updates
        .into_iter()
        .filter_map(|u| {
            let msg = u.message?;
            let text = msg.text?.trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(InboundCommand {
                update_id: u.update_id,
                chat_id: msg.chat.id,
                text,
            })
        })
        .collect()
}

/// Minimal escaping for Telegram's HTML parse mode. Player names and chat
/// text are attacker-controlled.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// The cursor to acknowledge everything in `commands`: one past the highest
/// update id seen, or the current offset when the batch was empty.
pub fn next_offset(current: i64, commands: &[InboundCommand]) -> i64 {
    commands
        .iter()
        .map(|c| c.update_id + 1)
        .max()
        .unwrap_or(current)
}
