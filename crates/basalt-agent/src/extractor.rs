use basalt_events::{LogEvent, PlayerName};
use regex::Regex;

// The Bedrock log format has drifted across server versions (and third-party
// builds echo Java-edition phrasing), so each kind carries the historical
// variants. First matching variant within a kind wins.
const JOIN_PATTERNS: &[&str] = &[
    r"Player connected: (.*?)(?:,|$)",
    r"Player (.*?) has connected",
    r"(.*?) joined the game",
    r"(?:Player|Client) (.*?) connected",
    r"\[INFO\].*? (.*?) joined the game",
];

const LEAVE_PATTERNS: &[&str] = &[
    r"Player disconnected: (.*?)(?:,|$)",
    r"Player (.*?) has disconnected",
    r"(.*?) left the game",
    r"(?:Player|Client) (.*?) disconnected",
    r"\[INFO\].*? (.*?) left the game",
];

const CHAT_PATTERNS: &[&str] = &[
    r"\[CHAT\] (.*?): (.*)",
    r"\[INFO\] (.*?) says: (.*)",
    r"<(.*?)> (.*)",
];

/// Classifies a single log line into at most one [`LogEvent`].
///
/// Kinds are tested in fixed priority order (join, leave, chat); the first
/// hit short-circuits the rest. Unmatched lines yield `None` and are not an
/// error. `ServerStarted`/`ServerStopped` are never derived from log text;
/// the supervisor fires those on confirmed transitions.
pub struct EventExtractor {
    join: Vec<Regex>,
    leave: Vec<Regex>,
    chat: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
}

impl EventExtractor {
    pub fn new() -> Self {
        Self {
            join: compile(JOIN_PATTERNS),
            leave: compile(LEAVE_PATTERNS),
            chat: compile(CHAT_PATTERNS),
        }
    }

    pub fn classify(&self, line: &str) -> Option<LogEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(name) = first_name(&self.join, line) {
            return Some(LogEvent::PlayerJoined { name });
        }
        if let Some(name) = first_name(&self.leave, line) {
            return Some(LogEvent::PlayerLeft { name });
        }
        for re in &self.chat {
            if let Some(caps) = re.captures(line) {
                let name = PlayerName::new(caps.get(1).map_or("", |m| m.as_str()));
                let text = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
                if !name.is_empty() && !text.is_empty() {
                    return Some(LogEvent::ChatMessage { name, text });
                }
            }
        }

        None
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn first_name(patterns: &[Regex], line: &str) -> Option<PlayerName> {
    for re in patterns {
        if let Some(caps) = re.captures(line) {
            let name = PlayerName::new(caps.get(1).map_or("", |m| m.as_str()));
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PlayerName {
        PlayerName::new(s)
    }

    #[test]
    fn bedrock_connect_line_yields_join() {
        let ex = EventExtractor::new();
        let ev = ex.classify("Player connected: Alice, xuid: 2535405");
        assert_eq!(
            ev,
            Some(LogEvent::PlayerJoined { name: name("Alice") })
        );
    }

    #[test]
    fn bedrock_connect_line_without_trailing_fields() {
        let ex = EventExtractor::new();
        assert_eq!(
            ex.classify("Player connected: Alice"),
            Some(LogEvent::PlayerJoined { name: name("Alice") })
        );
    }

    #[test]
    fn left_the_game_yields_leave() {
        let ex = EventExtractor::new();
        assert_eq!(
            ex.classify("Alice left the game"),
            Some(LogEvent::PlayerLeft { name: name("Alice") })
        );
    }

    #[test]
    fn bedrock_disconnect_line_yields_leave() {
        let ex = EventExtractor::new();
        assert_eq!(
            ex.classify("Player disconnected: Bob, xuid: 12345"),
            Some(LogEvent::PlayerLeft { name: name("Bob") })
        );
    }

    #[test]
    fn angle_bracket_chat_yields_message() {
        let ex = EventExtractor::new();
        assert_eq!(
            ex.classify("<Carol> hello everyone"),
            Some(LogEvent::ChatMessage {
                name: name("Carol"),
                text: "hello everyone".to_string(),
            })
        );
    }

    #[test]
    fn says_chat_variant_yields_message() {
        let ex = EventExtractor::new();
        assert_eq!(
            ex.classify("[INFO] Dave says: anyone online?"),
            Some(LogEvent::ChatMessage {
                name: name("Dave"),
                text: "anyone online?".to_string(),
            })
        );
    }

    #[test]
    fn join_takes_priority_over_chat() {
        // A chat-looking line that also matches a join variant must classify
        // as join: kinds are tested join, leave, chat.
        let ex = EventExtractor::new();
        let ev = ex.classify("<Eve> joined the game");
        assert_eq!(ev.map(|e| e.kind()), Some(basalt_events::EventKind::PlayerJoined));
    }

    #[test]
    fn unmatched_lines_yield_none() {
        let ex = EventExtractor::new();
        assert_eq!(ex.classify("Version: 1.20.81.01"), None);
        assert_eq!(ex.classify(""), None);
        assert_eq!(ex.classify("   "), None);
    }

    #[test]
    fn classify_is_deterministic() {
        let ex = EventExtractor::new();
        let line = "Player connected: Alice,";
        let first = ex.classify(line);
        // Interleave unrelated lines; same input must yield the same event.
        ex.classify("Bob left the game");
        ex.classify("<Carol> hi");
        assert_eq!(ex.classify(line), first);
    }
}
