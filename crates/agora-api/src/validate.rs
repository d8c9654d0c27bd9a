//! Input normalization and validation shared by the proposal and registry
//! creation gates.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::ApiError;

pub const TITLE_MIN: usize = 4;
pub const TITLE_MAX: usize = 160;
pub const BODY_MIN: usize = 10;
pub const BODY_MAX: usize = 5000;

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_single_line(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize line endings, strip trailing whitespace per line, and collapse
/// runs of blank lines down to one.
pub fn normalize_multiline(input: &str) -> String {
    let text = input.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for line in text.lines().map(|line| line.trim_end()) {
        if line.trim().is_empty() {
            if blank_run >= 1 {
                continue;
            }
            blank_run += 1;
            lines.push("");
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }

    lines.join("\n").trim().to_string()
}

pub fn title(input: &str) -> Result<String, ApiError> {
    let title = normalize_single_line(input);
    let length = title.chars().count();
    if length < TITLE_MIN || length > TITLE_MAX {
        return Err(ApiError::Validation(format!(
            "title must be {TITLE_MIN}-{TITLE_MAX} characters"
        )));
    }
    Ok(title)
}

pub fn body(input: &str) -> Result<String, ApiError> {
    let body = normalize_multiline(input);
    let length = body.chars().count();
    if length < BODY_MIN || length > BODY_MAX {
        return Err(ApiError::Validation(format!(
            "description must be {BODY_MIN}-{BODY_MAX} characters"
        )));
    }
    Ok(body)
}

/// Parse a deadline and require it to lie in the future. Accepts RFC 3339,
/// or the naive `YYYY-MM-DDTHH:MM[:SS]` shape browsers emit for
/// datetime-local inputs (read as UTC).
pub fn deadline(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ApiError> {
    let raw = input.trim();

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.and_utc())
        })
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").map(|dt| dt.and_utc()))
        .map_err(|_| ApiError::Validation("invalid deadline timestamp".to_string()))?;

    if parsed <= now {
        return Err(ApiError::Validation(
            "deadline must be in the future".to_string(),
        ));
    }

    Ok(parsed)
}
