//! Raw Microsoft Graph resources, deserialized as the API returns them.
//!
//! These structs never leave the crate boundary directly; every response
//! handed to a tool caller goes through the projections in
//! [`crate::sanitize`].

pub mod calendar;
pub mod planner;
pub mod todo;

use serde::{Deserialize, Serialize};

pub use calendar::{CalendarEvent, EmailAddress, Location, NewEvent, Recipient};
pub use planner::{
    NewPlannerTask, PlannerBucket, PlannerPlan, PlannerPriority, PlannerTask, PlannerTaskUpdate,
};
pub use todo::{Importance, NewTodoTask, TaskStatus, TodoTask, TodoTaskList, TodoTaskUpdate};

/// Collection wrapper used by every Graph list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCollection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Graph's `{dateTime, timeZone}` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl DateTimeTimeZone {
    pub fn utc(date_time: impl Into<String>) -> Self {
        Self {
            date_time: date_time.into(),
            time_zone: Some("UTC".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl ItemBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: Some("text".to_string()),
        }
    }
}

/// Formats a UTC instant the way Graph expects inside `DateTimeTimeZone`.
pub fn graph_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}
