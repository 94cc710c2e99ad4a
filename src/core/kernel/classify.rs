use crate::core::errors::ApiError;
use crate::core::types::{ErrorDetail, RateLimitStatus};
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, trace};

pub const RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

impl RateLimitStatus {
    /// Parse the rate limit headers. Absent unless all three are present
    /// and well-formed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = header_number(headers, RATE_LIMIT_LIMIT)?;
        let remaining = header_number(headers, RATE_LIMIT_REMAINING)?;
        let reset_secs: i64 = header_number(headers, RATE_LIMIT_RESET)?;
        let reset = Utc.timestamp_opt(reset_secs, 0).single()?;

        Some(Self {
            limit,
            remaining,
            reset,
        })
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Build the error for a non-success response. Never fails: bodies that match
/// no known envelope become a single entry carrying the raw text.
pub fn classify_error(status: u16, body: &str, rate_limit: Option<RateLimitStatus>) -> ApiError {
    let errors = match serde_json::from_str::<Value>(body) {
        Ok(json) => from_json(&json),
        Err(_) => from_markup(body),
    }
    .unwrap_or_else(|| vec![ErrorDetail::new(None, body)]);

    debug!(status, error_count = errors.len(), "Classified API error");
    trace!("Error body: {}", body);

    ApiError {
        status,
        errors,
        body: body.to_string(),
        rate_limit,
    }
}

fn from_json(json: &Value) -> Option<Vec<ErrorDetail>> {
    let errors = match json.get("errors") {
        Some(Value::Array(items)) => items.iter().filter_map(detail_from_json).collect(),
        Some(Value::String(text)) => split_lines(text),
        _ => match json.get("error") {
            Some(Value::String(text)) => split_lines(text),
            _ => Vec::new(),
        },
    };

    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}

fn detail_from_json(item: &Value) -> Option<ErrorDetail> {
    let message = item.get("message").and_then(Value::as_str)?;
    let code = item
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok());
    Some(ErrorDetail::new(code, message))
}

fn split_lines(text: &str) -> Vec<ErrorDetail> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ErrorDetail::new(None, line))
        .collect()
}

fn markup_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)<h1>(.*?)</h1>",
            r"(?is)<error>(.*?)</error>",
            r"(?is)Reason:\s*<pre>(.*?)</pre>",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

fn from_markup(body: &str) -> Option<Vec<ErrorDetail>> {
    markup_patterns().iter().find_map(|pattern| {
        let message = pattern.captures(body)?.get(1)?.as_str().trim();
        if message.is_empty() {
            None
        } else {
            Some(vec![ErrorDetail::new(None, message)])
        }
    })
}
