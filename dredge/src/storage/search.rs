//! Search query parsing.
//!
//! Format: `username:<u> channel:<c> date:<from>~<to> <free text>`. Every
//! part is optional; whatever is left after removing the filters is the
//! free-text substring.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"username:(\S+)").expect("valid regex"));
static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"channel:(\S+)").expect("valid regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"date:([^~\s]+)~(\S+)").expect("valid regex"));

/// Parsed search filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub username: Option<String>,
    pub channel: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive (Unicode) substring of the message text.
    pub text: Option<String>,
}

impl SearchParams {
    /// Parse a search string. Never fails: an unparseable date bound is
    /// ignored and the rest of the filter still applies.
    pub fn parse(query: &str) -> Self {
        let mut rest = query.to_string();
        let mut params = Self::default();

        if let Some(caps) = USERNAME_RE.captures(&rest) {
            params.username = Some(caps[1].to_lowercase());
            rest = rest.replacen(&caps[0], "", 1);
        }

        if let Some(caps) = CHANNEL_RE.captures(&rest) {
            params.channel = Some(caps[1].trim_start_matches('#').to_lowercase());
            rest = rest.replacen(&caps[0], "", 1);
        }

        if let Some(caps) = DATE_RE.captures(&rest) {
            params.date_from = parse_date(&caps[1]);
            params.date_to = parse_date(&caps[2]);
            rest = rest.replacen(&caps[0], "", 1);
        }

        let text = rest.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            params.text = Some(text);
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`,
/// `MM/DD/YYYY` and RFC 3339. Zone-less values are taken as UTC.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}
