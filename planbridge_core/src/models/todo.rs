use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DateTimeTimeZone, ItemBody};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTaskList {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub wellknown_list_name: Option<String>,
    #[serde(rename = "@odata.etag", default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub is_reminder_on: bool,
    #[serde(default)]
    pub body: Option<ItemBody>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub due_date_time: Option<DateTimeTimeZone>,
    #[serde(default)]
    pub reminder_date_time: Option<DateTimeTimeZone>,
    #[serde(default)]
    pub completed_date_time: Option<DateTimeTimeZone>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
    #[serde(rename = "@odata.etag", default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    WaitingOnOthers,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Importance {
    Low,
    Normal,
    High,
}

/// Fields accepted when creating a To Do task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NewTodoTask {
    /// Task title (1-400 characters)
    pub title: String,
    /// Plain-text notes
    #[serde(default)]
    pub body: Option<String>,
    /// Due date, YYYY-MM-DD or ISO 8601 date-time
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub importance: Option<Importance>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// Partial update; omitted fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TodoTaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Due date, YYYY-MM-DD or ISO 8601 date-time
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub importance: Option<Importance>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl TodoTaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.due_date.is_none()
            && self.importance.is_none()
            && self.status.is_none()
            && self.categories.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_graph_task() {
        let task: TodoTask = serde_json::from_value(serde_json::json!({
            "@odata.etag": "W/\"xyz\"",
            "id": "AAMkAGI=",
            "title": "Buy milk",
            "status": "notStarted",
            "importance": "high",
            "isReminderOn": false,
            "body": {"content": "2%", "contentType": "text"},
            "dueDateTime": {"dateTime": "2025-07-04T00:00:00.0000000", "timeZone": "UTC"},
            "createdDateTime": "2025-06-01T10:00:00Z",
            "linkedResources": []
        }))
        .unwrap();
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.etag.as_deref(), Some("W/\"xyz\""));
        assert_eq!(
            task.due_date_time.unwrap().date_time,
            "2025-07-04T00:00:00.0000000"
        );
        assert!(task.categories.is_empty());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(TaskStatus::WaitingOnOthers).unwrap(),
            "waitingOnOthers"
        );
        assert!(TodoTaskUpdate::default().is_empty());
    }

    #[test]
    fn status_only_update_is_not_empty() {
        let update = TodoTaskUpdate {
            status: Some(TaskStatus::Completed),
            ..TodoTaskUpdate::default()
        };
        assert!(!update.is_empty());
    }
}
