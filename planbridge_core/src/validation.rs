//! Whitelist guards for every value a tool caller hands us.
//!
//! All validators are pure. A rejection is a [`GraphError::Validation`] whose
//! message is safe to show to the caller verbatim.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GraphError;

pub const MAX_ID_LENGTH: usize = 200;
pub const MAX_SEARCH_LENGTH: usize = 1000;
pub const MAX_TITLE_LENGTH: usize = 400;
pub const MAX_FILTER_LENGTH: usize = 1000;
pub const MAX_DATE_RANGE_DAYS: i64 = 365;
pub const MAX_DUE_DATE_YEARS: u32 = 5;

pub const ALLOWED_FILTER_FIELDS: &[&str] = &[
    "status",
    "importance",
    "title",
    "dueDateTime",
    "createdDateTime",
    "lastModifiedDateTime",
    "completedDateTime",
    "isReminderOn",
];

pub const ALLOWED_FILTER_OPERATORS: &[&str] =
    &["eq", "ne", "gt", "ge", "lt", "le", "and", "or", "not"];

const FILTER_LITERALS: &[&str] = &["true", "false", "null"];
const ALLOWED_PERCENT_COMPLETE: &[i64] = &[0, 50, 100];

static FILTER_SUSPICIOUS_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[;<>{}\[\]\\]").expect("valid regex"));

static FILTER_SUSPICIOUS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(drop|delete|update|insert|exec|script|eval|process|require)\b")
        .expect("valid regex")
});

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<script").expect("valid regex"));

static JAVASCRIPT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid regex"));

static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("valid regex"));

static SHELL_METACHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[;&|`$()]").expect("valid regex"));

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-+=]+$").expect("valid regex"));

static FILTER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^(?:
            (?P<ws>\s+)
          | (?P<string>'(?:[^']|'')*')
          | (?P<datetime>\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:\d{2})?)?)
          | (?P<number>-?\d+(?:\.\d+)?)
          | (?P<open>\()
          | (?P<close>\))
          | (?P<word>[A-Za-z_][A-Za-z0-9_]*(?:/[A-Za-z_][A-Za-z0-9_]*)*)
        )",
    )
    .expect("valid regex")
});

fn contains_script_markup(value: &str) -> bool {
    SCRIPT_TAG.is_match(value) || JAVASCRIPT_URL.is_match(value) || EVENT_HANDLER.is_match(value)
}

/// Where the previous token leaves the parser; decides whether an unknown
/// word is reported as a field or as an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    ExpectOperand,
    AfterField,
    AfterValue,
}

/// Validate an OData `$filter` expression. Blank input means "no filter"
/// and is accepted.
pub fn validate_odata_filter(filter: &str) -> Result<(), GraphError> {
    if filter.trim().is_empty() {
        return Ok(());
    }
    if filter.contains('\0') {
        return Err(GraphError::validation("Filter contains invalid characters"));
    }
    if filter.chars().count() > MAX_FILTER_LENGTH {
        return Err(GraphError::validation(format!(
            "Filter is too long (maximum {} characters)",
            MAX_FILTER_LENGTH
        )));
    }
    if FILTER_SUSPICIOUS_CHARS.is_match(filter)
        || FILTER_SUSPICIOUS_KEYWORDS.is_match(filter)
        || contains_script_markup(filter)
    {
        return Err(GraphError::validation(
            "Filter contains potentially dangerous content",
        ));
    }

    let mut rest = filter;
    let mut position = Position::ExpectOperand;
    while !rest.is_empty() {
        let caps = FILTER_TOKEN.captures(rest).ok_or_else(|| {
            let near: String = rest.chars().take(20).collect();
            GraphError::validation(format!("Invalid filter syntax near '{}'", near))
        })?;
        let token_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
        if token_len == 0 {
            return Err(GraphError::validation("Invalid filter syntax"));
        }

        if caps.name("ws").is_some() || caps.name("open").is_some() {
            // whitespace and '(' do not move the parser
        } else if caps.name("string").is_some()
            || caps.name("datetime").is_some()
            || caps.name("number").is_some()
            || caps.name("close").is_some()
        {
            position = Position::AfterValue;
        } else if let Some(word) = caps.name("word") {
            position = classify_filter_word(word.as_str(), position)?;
        }

        rest = &rest[token_len..];
    }
    Ok(())
}

fn classify_filter_word(word: &str, position: Position) -> Result<Position, GraphError> {
    let lower = word.to_ascii_lowercase();
    if ALLOWED_FILTER_OPERATORS.contains(&lower.as_str()) {
        // Comparison and logical operators are both followed by an operand.
        return Ok(Position::ExpectOperand);
    }
    if FILTER_LITERALS.contains(&lower.as_str()) {
        return Ok(Position::AfterValue);
    }
    match position {
        Position::AfterField | Position::AfterValue => Err(GraphError::validation(format!(
            "Invalid filter operator '{}'. Allowed operators: {}",
            word,
            ALLOWED_FILTER_OPERATORS.join(", ")
        ))),
        Position::ExpectOperand => {
            let root = word.split('/').next().unwrap_or(word);
            if ALLOWED_FILTER_FIELDS.contains(&root) {
                Ok(Position::AfterField)
            } else {
                Err(GraphError::validation(format!(
                    "Invalid filter field '{}'. Allowed fields: {}",
                    word,
                    ALLOWED_FILTER_FIELDS.join(", ")
                )))
            }
        }
    }
}

/// Validate a Graph resource identifier (list, task, plan, bucket, event).
pub fn validate_id<'a>(id: &'a str, label: &str) -> Result<&'a str, GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::validation(format!("{} is required", label)));
    }
    if id.contains('\0') {
        return Err(GraphError::validation(format!(
            "{} contains invalid characters",
            label
        )));
    }
    if id.chars().count() > MAX_ID_LENGTH {
        return Err(GraphError::validation(format!(
            "{} is too long (maximum {} characters)",
            label, MAX_ID_LENGTH
        )));
    }
    if !IDENTIFIER.is_match(id) {
        return Err(GraphError::validation(format!(
            "{} has an invalid format. Only letters, digits, '_', '-', '+' and '=' are allowed",
            label
        )));
    }
    Ok(id)
}

/// Validate free-text search input.
pub fn validate_search_query(query: &str) -> Result<&str, GraphError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(GraphError::validation("Search query is required"));
    }
    if query.chars().count() > MAX_SEARCH_LENGTH {
        return Err(GraphError::validation(format!(
            "Search query is too long (maximum {} characters)",
            MAX_SEARCH_LENGTH
        )));
    }
    if query.contains('\0') {
        return Err(GraphError::validation(
            "Search query contains invalid characters",
        ));
    }
    if contains_script_markup(query) || SHELL_METACHARS.is_match(query) {
        return Err(GraphError::validation(
            "Search query contains potentially dangerous content",
        ));
    }
    Ok(trimmed)
}

pub fn validate_title(title: &str) -> Result<&str, GraphError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(GraphError::validation("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(GraphError::validation(format!(
            "Title is too long (maximum {} characters)",
            MAX_TITLE_LENGTH
        )));
    }
    if title.contains('\0') {
        return Err(GraphError::validation("Title contains invalid characters"));
    }
    if contains_script_markup(title) {
        return Err(GraphError::validation(
            "Title contains potentially dangerous content",
        ));
    }
    Ok(trimmed)
}

/// Accepts `YYYY-MM-DD`, naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC) and
/// RFC 3339 timestamps.
pub fn parse_date_input(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn validate_due_date(input: &str) -> Result<DateTime<Utc>, GraphError> {
    validate_due_date_at(input, Utc::now())
}

pub fn validate_due_date_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, GraphError> {
    let due = parse_date_input(input).ok_or_else(|| {
        GraphError::validation("Invalid due date. Use YYYY-MM-DD or an ISO 8601 date-time")
    })?;
    let limit = now
        .checked_add_months(Months::new(MAX_DUE_DATE_YEARS * 12))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if due > limit {
        return Err(GraphError::validation(format!(
            "Due date cannot be more than {} years in the future",
            MAX_DUE_DATE_YEARS
        )));
    }
    Ok(due)
}

pub fn validate_date_range(
    start: &str,
    end: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), GraphError> {
    let start = parse_date_input(start)
        .ok_or_else(|| GraphError::validation("Invalid start date. Use an ISO 8601 date-time"))?;
    let end = parse_date_input(end)
        .ok_or_else(|| GraphError::validation("Invalid end date. Use an ISO 8601 date-time"))?;
    if end <= start {
        return Err(GraphError::validation("End date must be after start date"));
    }
    if end - start > Duration::days(MAX_DATE_RANGE_DAYS) {
        return Err(GraphError::validation(format!(
            "Date range cannot exceed {} days",
            MAX_DATE_RANGE_DAYS
        )));
    }
    Ok((start, end))
}

/// Planner only accepts 0, 50 and 100.
pub fn validate_percent_complete(value: i64) -> Result<u8, GraphError> {
    if ALLOWED_PERCENT_COMPLETE.contains(&value) {
        Ok(value as u8)
    } else {
        Err(GraphError::validation(
            "Percent complete must be 0 (not started), 50 (in progress) or 100 (completed)",
        ))
    }
}
