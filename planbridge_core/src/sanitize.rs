//! Projections applied to everything that crosses back to the tool caller.
//!
//! Resource projections drop Graph bookkeeping (etags, change keys, order
//! hints, assignment maps) and flatten `{dateTime, timeZone}` wrappers to the
//! bare timestamp. Error projections keep a single scrubbed line of text and
//! the error-kind name, nothing else.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, GraphError};
use crate::models::{
    CalendarEvent, DateTimeTimeZone, PlannerBucket, PlannerPlan, PlannerPriority, PlannerTask,
    TodoTask, TodoTaskList,
};

pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

// A path starts at a token boundary and is either a drive path, a rooted path
// of any depth, or a relative path ending in a file name with an extension.
// Slash-separated words without an extension ("todo/nope", "and/or") survive.
static PATH_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?P<pre>^|[\s'"(=])"#,
        r#"(?:[A-Za-z]:\\[^\s'"]*"#,
        r#"|(?:~|\.{1,2})?/[\w.\-]+(?:/[\w.\-]*)*[^\s'"]*"#,
        r#"|[\w.\-]+(?:/[\w.\-]+)*/[\w\-]+\.\w+[^\s'"]*)"#,
    ))
    .expect("valid regex")
});

fn flatten(dt: Option<DateTimeTimeZone>) -> Option<String> {
    dt.map(|d| d.date_time)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedTaskList {
    pub id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub is_shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wellknown_list_name: Option<String>,
}

impl From<TodoTaskList> for SanitizedTaskList {
    fn from(list: TodoTaskList) -> Self {
        Self {
            id: list.id,
            display_name: list.display_name,
            is_owner: list.is_owner,
            is_shared: list.is_shared,
            wellknown_list_name: list.wellknown_list_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedTask {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    pub is_reminder_on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<String>,
}

impl From<TodoTask> for SanitizedTask {
    fn from(task: TodoTask) -> Self {
        Self {
            id: task.id,
            title: task.title,
            status: task.status,
            importance: task.importance,
            is_reminder_on: task.is_reminder_on,
            body: task
                .body
                .map(|b| b.content)
                .filter(|content| !content.trim().is_empty()),
            categories: task.categories,
            due_date_time: flatten(task.due_date_time),
            reminder_date_time: flatten(task.reminder_date_time),
            completed_date_time: flatten(task.completed_date_time),
            created_date_time: task.created_date_time,
            last_modified_date_time: task.last_modified_date_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedEvent {
    pub id: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_zone: Option<String>,
    pub is_all_day: bool,
    pub is_cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    pub attendee_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_as: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_link: Option<String>,
}

impl From<CalendarEvent> for SanitizedEvent {
    fn from(event: CalendarEvent) -> Self {
        let (start, start_time_zone) = split_zone(event.start);
        let (end, end_time_zone) = split_zone(event.end);
        Self {
            id: event.id,
            subject: event.subject.unwrap_or_default(),
            body_preview: event.body_preview.filter(|p| !p.is_empty()),
            start,
            start_time_zone,
            end,
            end_time_zone,
            is_all_day: event.is_all_day,
            is_cancelled: event.is_cancelled,
            location: event
                .location
                .and_then(|l| l.display_name)
                .filter(|name| !name.is_empty()),
            organizer: event
                .organizer
                .and_then(|o| o.email_address.name.or(o.email_address.address)),
            attendee_count: event.attendees.len(),
            show_as: event.show_as,
            web_link: event.web_link,
        }
    }
}

fn split_zone(dt: Option<DateTimeTimeZone>) -> (Option<String>, Option<String>) {
    match dt {
        Some(d) => (Some(d.date_time), d.time_zone),
        None => (None, None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedPlannerTask {
    pub id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    pub title: String,
    pub percent_complete: u8,
    pub priority: PlannerPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    pub assignee_count: usize,
}

impl From<PlannerTask> for SanitizedPlannerTask {
    fn from(task: PlannerTask) -> Self {
        Self {
            id: task.id,
            plan_id: task.plan_id,
            bucket_id: task.bucket_id,
            title: task.title,
            percent_complete: task.percent_complete,
            priority: PlannerPriority::from_code(task.priority.unwrap_or(5)),
            start_date_time: task.start_date_time,
            due_date_time: task.due_date_time,
            completed_date_time: task.completed_date_time,
            created_date_time: task.created_date_time,
            assignee_count: task.assignments.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedBucket {
    pub id: String,
    pub name: String,
    pub plan_id: String,
}

impl From<PlannerBucket> for SanitizedBucket {
    fn from(bucket: PlannerBucket) -> Self {
        Self {
            id: bucket.id,
            name: bucket.name,
            plan_id: bucket.plan_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedPlan {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
}

impl From<PlannerPlan> for SanitizedPlan {
    fn from(plan: PlannerPlan) -> Self {
        Self {
            id: plan.id,
            title: plan.title,
            created_date_time: plan.created_date_time,
        }
    }
}

/// Project a whole collection.
pub fn sanitize_all<R, S: From<R>>(items: Vec<R>) -> Vec<S> {
    items.into_iter().map(S::from).collect()
}

/// What a caller sees when a tool fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SanitizedError {
    pub fn generic() -> Self {
        Self {
            error: GENERIC_ERROR_MESSAGE.to_string(),
            code: None,
        }
    }
}

/// Keep the first line, cut everything from "stack" onwards and redact
/// anything that looks like a file-system path.
pub fn scrub_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("");
    let cut = match first_line.to_ascii_lowercase().find("stack") {
        Some(idx) => &first_line[..idx],
        None => first_line,
    };
    let redacted = PATH_LIKE.replace_all(cut, "${pre}[redacted]");
    let trimmed = redacted.trim().trim_end_matches(':').trim_end();
    if trimmed.is_empty() {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_graph_error(err: &GraphError) -> SanitizedError {
    // Only the display message is read; retry_after_ms and status stay internal.
    SanitizedError {
        error: scrub_message(&err.to_string()),
        code: Some(err.kind_name().to_string()),
    }
}

pub fn sanitize_error(err: &ConnectorError) -> SanitizedError {
    match err {
        ConnectorError::Graph(graph) => sanitize_graph_error(graph),
        ConnectorError::InvalidParams(msg) => SanitizedError {
            error: scrub_message(msg),
            code: Some("ValidationError".to_string()),
        },
        ConnectorError::ToolNotFound(name) => SanitizedError {
            error: scrub_message(&format!("Unknown tool: {}", name)),
            code: None,
        },
        ConnectorError::SerdeJson(_) => SanitizedError {
            error: "Invalid arguments".to_string(),
            code: None,
        },
        ConnectorError::MethodNotFound | ConnectorError::ParseError => SanitizedError {
            error: scrub_message(&err.to_string()),
            code: None,
        },
        ConnectorError::Internal(_) => SanitizedError::generic(),
    }
}

/// Fallback for errors from outside the crate's taxonomy.
pub fn sanitize_dyn_error(err: &(dyn std::error::Error + 'static)) -> SanitizedError {
    if let Some(graph) = err.downcast_ref::<GraphError>() {
        return sanitize_graph_error(graph);
    }
    if let Some(connector) = err.downcast_ref::<ConnectorError>() {
        return sanitize_error(connector);
    }
    SanitizedError {
        error: scrub_message(&err.to_string()),
        code: None,
    }
}
