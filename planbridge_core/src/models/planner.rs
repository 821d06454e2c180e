use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerPlan {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub container: Option<serde_json::Value>,
    #[serde(rename = "@odata.etag", default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerBucket {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub order_hint: Option<String>,
    #[serde(rename = "@odata.etag", default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerTask {
    pub id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub percent_complete: u8,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub due_date_time: Option<String>,
    #[serde(default)]
    pub completed_date_time: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    /// Keyed by user id; only the count is ever exposed.
    #[serde(default)]
    pub assignments: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub order_hint: Option<String>,
    #[serde(default)]
    pub conversation_thread_id: Option<String>,
    #[serde(rename = "@odata.etag", default)]
    pub etag: Option<String>,
}

/// Planner stores priority as 0-10; callers only ever see these four labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlannerPriority {
    Urgent,
    High,
    Normal,
    Low,
}

impl PlannerPriority {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 | 1 => PlannerPriority::Urgent,
            2 | 3 => PlannerPriority::High,
            4 | 5 => PlannerPriority::Normal,
            _ => PlannerPriority::Low,
        }
    }

    /// The value Planner itself uses when the label is picked in its UI.
    pub fn code(self) -> u8 {
        match self {
            PlannerPriority::Urgent => 1,
            PlannerPriority::High => 3,
            PlannerPriority::Normal => 5,
            PlannerPriority::Low => 9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlannerPriority::Urgent => "urgent",
            PlannerPriority::High => "high",
            PlannerPriority::Normal => "normal",
            PlannerPriority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NewPlannerTask {
    /// Plan that will own the task
    pub plan_id: String,
    /// Bucket inside the plan
    #[serde(default)]
    pub bucket_id: Option<String>,
    /// Task title (1-400 characters)
    pub title: String,
    /// Due date, YYYY-MM-DD or ISO 8601 date-time
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<PlannerPriority>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlannerTaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub bucket_id: Option<String>,
    /// 0 (not started), 50 (in progress) or 100 (completed)
    #[serde(default)]
    pub percent_complete: Option<i64>,
    #[serde(default)]
    pub priority: Option<PlannerPriority>,
    /// Due date, YYYY-MM-DD or ISO 8601 date-time
    #[serde(default)]
    pub due_date: Option<String>,
}

impl PlannerTaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.bucket_id.is_none()
            && self.percent_complete.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}
