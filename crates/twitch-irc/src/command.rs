//! Outbound IRC commands.

/// Capabilities requested right after connecting.
pub const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands";

/// Normalize a channel name: trim, drop a leading `#`, lowercase.
pub fn normalize_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

pub fn cap_req() -> String {
    format!("CAP REQ :{CAPABILITIES}")
}

/// `PASS oauth:<token>`. Tokens that already carry the `oauth:` prefix are
/// sent as-is.
pub fn pass(token: &str) -> String {
    if token.starts_with("oauth:") {
        format!("PASS {token}")
    } else {
        format!("PASS oauth:{token}")
    }
}

pub fn nick(nick: &str) -> String {
    format!("NICK {}", nick.trim().to_lowercase())
}

pub fn join(channel: &str) -> String {
    format!("JOIN #{}", normalize_channel(channel))
}

pub fn part(channel: &str) -> String {
    format!("PART #{}", normalize_channel(channel))
}

/// Reply to a server `PING`, echoing its argument.
pub fn pong(argument: Option<&str>) -> String {
    format!("PONG :{}", argument.unwrap_or("tmi.twitch.tv"))
}
