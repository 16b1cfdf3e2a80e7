//! Alert selectors.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{AlertConfig, AlertEntry};
use crate::{Error, Result};

/// Pattern used when an entry has no message pattern.
const MATCH_ALL: &str = ".*";

/// One compiled alert rule.
#[derive(Debug, Clone)]
pub struct AlertSelector {
    message: Regex,
    exclude_channels: HashSet<String>,
    exclude_usernames: HashSet<String>,
}

impl AlertSelector {
    pub fn compile(entry: &AlertEntry) -> Result<Self> {
        let pattern = if entry.message.is_empty() {
            MATCH_ALL
        } else {
            entry.message.as_str()
        };
        let message = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            message,
            exclude_channels: lowercase_set(&entry.exclude_channels),
            exclude_usernames: lowercase_set(&entry.exclude_usernames),
        })
    }

    pub fn matches(&self, channel: &str, username: &str, text: &str) -> bool {
        !self.exclude_channels.contains(channel)
            && !self.exclude_usernames.contains(username)
            && self.message.is_match(text)
    }
}

/// Ordered selectors plus a global username exclude list.
#[derive(Debug, Clone, Default)]
pub struct AlertMatcher {
    selectors: Vec<AlertSelector>,
    exclude_usernames: HashSet<String>,
}

impl AlertMatcher {
    /// Compile every configured entry. An invalid pattern is an error.
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let selectors = config
            .list
            .iter()
            .map(AlertSelector::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            selectors,
            exclude_usernames: lowercase_set(&config.exclude_usernames),
        })
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// First matching selector wins; globally excluded users never alert.
    pub fn is_alertable(&self, channel: &str, username: &str, text: &str) -> bool {
        if self.exclude_usernames.contains(username) {
            return false;
        }
        self.selectors
            .iter()
            .any(|selector| selector.matches(channel, username, text))
    }
}

fn lowercase_set(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|s| s.trim().trim_start_matches('#').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str, channels: &[&str], users: &[&str]) -> AlertEntry {
        AlertEntry {
            message: message.to_string(),
            exclude_channels: channels.iter().map(|s| s.to_string()).collect(),
            exclude_usernames: users.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matcher(entries: Vec<AlertEntry>, global_excludes: &[&str]) -> AlertMatcher {
        AlertMatcher::from_config(&AlertConfig {
            list: entries,
            exclude_usernames: global_excludes.iter().map(|s| s.to_string()).collect(),
            permanent_channels: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_pattern_matches_substring() {
        let m = matcher(vec![entry("outage", &[], &[])], &[]);
        assert!(m.is_alertable("chan", "alice", "service outage detected"));
        assert!(!m.is_alertable("chan", "alice", "all good"));
    }

    #[test]
    fn test_global_exclude_wins() {
        let m = matcher(vec![entry("", &[], &[])], &["NightBot"]);
        assert!(m.is_alertable("chan", "alice", "anything"));
        assert!(!m.is_alertable("chan", "nightbot", "anything"));
    }

    #[test]
    fn test_selector_excludes_fall_through_to_next() {
        let m = matcher(
            vec![
                entry("outage", &["#Quiet"], &[]),
                entry("outage", &[], &["bob"]),
            ],
            &[],
        );
        // First selector skips the channel, second one still matches.
        assert!(m.is_alertable("quiet", "alice", "outage"));
        // Excluded by the channel in the first and the user in the second.
        assert!(!m.is_alertable("quiet", "bob", "outage"));
        assert!(m.is_alertable("loud", "bob", "outage"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let m = matcher(vec![entry("", &[], &[])], &[]);
        assert!(m.is_alertable("c", "u", ""));
    }

    #[test]
    fn test_no_selectors_never_alert() {
        let m = matcher(vec![], &[]);
        assert!(m.is_empty());
        assert!(!m.is_alertable("c", "u", "outage"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = AlertMatcher::from_config(&AlertConfig {
            list: vec![entry("(unclosed", &[], &[])],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
