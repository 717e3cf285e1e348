//! Inbound line decoder.
//!
//! Firmware revisions report state in several ad hoc formats. Each line is
//! tried against these shapes in order:
//!
//! ```text
//! 1. [Status:] L1=ON L2=OFF      (or L1=ON:L2=OFF)   -> StatusSnapshot
//! 2. LIGHT2:ON                   (exactly one colon) -> StateUpdate
//! 3. ... toggled ...                                 -> Acknowledgment
//! 4. ERROR: ... / ... Unknown ...                    -> ErrorReport
//! 5. anything else                                   -> Info
//! ```
//!
//! Decoding never fails; unrecognised input degrades to `Info`.

use crate::domain::models::{DeviceKey, ParsedMessage};
use tracing::trace;

const STATUS_PREFIX: &str = "status:";
const ERROR_PREFIX: &str = "ERROR:";

/// Keys that look like `KEY:VALUE` but are never device reports.
const RESERVED_KEYS: &[&str] = &["ERROR", "STATUS", "INFO", "OK"];

const NUMBER_WORDS: [&str; 8] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight",
];

/// Decode one line. Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Option<ParsedMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let message = parse_status_snapshot(line)
        .or_else(|| parse_state_update(line))
        .or_else(|| parse_acknowledgment(line))
        .unwrap_or_else(|| {
            if line.starts_with(ERROR_PREFIX) || line.contains("Unknown") {
                ParsedMessage::ErrorReport {
                    raw: line.to_string(),
                }
            } else {
                ParsedMessage::Info {
                    raw: line.to_string(),
                }
            }
        });

    trace!("Parsed {:?} as {:?}", line, message);
    Some(message)
}

/// Decode a payload that may carry several lines.
#[cfg(test)]
pub fn parse_payload(payload: &str) -> Vec<ParsedMessage> {
    super::protocol::split_lines(payload)
        .filter_map(parse_line)
        .collect()
}

fn parse_status_snapshot(line: &str) -> Option<ParsedMessage> {
    if !line.contains('=') {
        return None;
    }

    let body = match line.get(..STATUS_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(STATUS_PREFIX) => &line[STATUS_PREFIX.len()..],
        _ => line,
    };

    let tokens: Vec<&str> = body
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',' || c == ';')
        .filter(|token| !token.is_empty())
        .collect();
    // Free text mentioning a key is not a snapshot.
    if tokens.iter().any(|token| !token.contains('=')) {
        return None;
    }

    let states: Vec<(String, bool)> = tokens
        .into_iter()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            let key = key.trim();
            DeviceKey::parse(key)?;
            let value = value.trim();
            Some((key.to_string(), value == "ON" || value == "1"))
        })
        .collect();

    if states.is_empty() {
        return None;
    }
    Some(ParsedMessage::StatusSnapshot { states })
}

fn parse_state_update(line: &str) -> Option<ParsedMessage> {
    let (key, value) = line.split_once(':')?;
    if value.contains(':') {
        return None;
    }

    let key = key.trim();
    let value = value.trim();
    if !is_token(key) || !is_token(value) {
        return None;
    }
    if RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key)) {
        return None;
    }

    Some(ParsedMessage::StateUpdate {
        key: key.to_string(),
        on: value == "ON",
    })
}

fn parse_acknowledgment(line: &str) -> Option<ParsedMessage> {
    if !line.contains("toggled") && !line.contains("Toggled") {
        return None;
    }

    Some(ParsedMessage::Acknowledgment {
        raw: line.to_string(),
        switch: trailing_switch_number(line),
    })
}

/// Last number (digit or `one`..`eight`) mentioned in the line.
fn trailing_switch_number(line: &str) -> Option<u32> {
    line.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .rev()
        .find_map(|word| {
            let lower = word.to_ascii_lowercase();
            if let Some(pos) = NUMBER_WORDS.iter().position(|w| *w == lower) {
                return Some(pos as u32 + 1);
            }
            // Handles both `5` and `LIGHT5`
            let digits: String = word
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            digits.parse().ok()
        })
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
