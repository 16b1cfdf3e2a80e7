//! IRC message decoding.
//!
//! Twitch speaks IRC with the IRCv3 message-tags extension, so a chat line
//! looks like:
//!
//! ```text
//! @badge-info=;display-name=User;id=abc123;tmi-sent-ts=1700000000000 :user!user@user.tmi.twitch.tv PRIVMSG #channel :Hello world!
//! ```

use std::collections::HashMap;

use crate::error::{IrcError, Result};

/// A decoded IRC line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    /// IRCv3 tags with escaped values already decoded.
    pub tags: HashMap<String, String>,
    /// Source prefix without the leading `:`.
    pub prefix: Option<String>,
    /// Command verb or numeric, uppercased.
    pub command: String,
    /// Middle params followed by the trailing param (if any).
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single IRC line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(IrcError::Empty);
        }

        let mut rest = line;
        let mut tags = HashMap::new();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (tag_str, remaining) = stripped
                .split_once(' ')
                .ok_or_else(|| IrcError::MissingCommand(line.to_string()))?;

            for tag in tag_str.split(';').filter(|t| !t.is_empty()) {
                let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
                tags.insert(key.to_string(), unescape_tag_value(value));
            }
            rest = remaining.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (source, remaining) = stripped
                .split_once(' ')
                .ok_or_else(|| IrcError::MissingCommand(line.to_string()))?;
            prefix = Some(source.to_string());
            rest = remaining.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(IrcError::MissingCommand(line.to_string()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, remaining)) => {
                    params.push(param.to_string());
                    rest = remaining;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Parse every non-empty line of a transport frame.
    ///
    /// Twitch batches several IRC lines into one WebSocket text frame.
    pub fn parse_frame(frame: &str) -> impl Iterator<Item = Result<Self>> + '_ {
        frame
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse)
    }

    /// Tag value, treating empty values as absent.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Param at `index`, or an error naming the command.
    pub fn require_param(&self, index: usize) -> Result<&str> {
        self.param(index)
            .ok_or_else(|| IrcError::missing_param(&self.command, index))
    }

    /// The last param, which carries the message body for PRIVMSG.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Nick portion of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split_once('!'))
            .map(|(nick, _)| nick)
    }

    /// Channel name of the first param, without the leading `#`.
    pub fn channel(&self) -> Option<&str> {
        self.param(0).and_then(|c| c.strip_prefix('#'))
    }

    pub fn is(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }
}

/// Decode IRCv3 tag value escapes.
fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A lone trailing backslash is dropped.
            None => {}
        }
    }
    out
}
