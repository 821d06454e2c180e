use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::error::{parse_args, ConnectorError};
use crate::models::{NewPlannerTask, PlannerTaskUpdate};
use crate::services::PlannerService;
use crate::utils::{structured_result_with_text, tool};
use crate::Connector;

use super::{Deleted, NoArgs};

#[derive(Debug, Deserialize, JsonSchema)]
struct PlanRef {
    plan_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListTasksArgs {
    plan_id: String,
    /// Only tasks in this bucket
    #[serde(default)]
    bucket_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TaskRef {
    task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateTaskArgs {
    task_id: String,
    #[serde(flatten)]
    update: PlannerTaskUpdate,
}

pub struct PlannerConnector {
    service: Arc<PlannerService>,
}

impl PlannerConnector {
    pub fn new(service: Arc<PlannerService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Connector for PlannerConnector {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn description(&self) -> &'static str {
        "Microsoft Planner plans, buckets and tasks"
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ConnectorError> {
        Ok(vec![
            tool::<NoArgs>("list_plans", "List Planner plans the signed-in user belongs to")?,
            tool::<PlanRef>("list_buckets", "List the buckets of a Planner plan")?,
            tool::<ListTasksArgs>(
                "list_tasks",
                "List tasks of a Planner plan, or of one bucket in it",
            )?,
            tool::<TaskRef>("get_task", "Get one Planner task")?,
            tool::<NewPlannerTask>("create_task", "Create a task in a Planner plan")?,
            tool::<UpdateTaskArgs>(
                "update_task",
                "Update a Planner task; omitted fields are left unchanged",
            )?,
            tool::<TaskRef>("delete_task", "Delete a Planner task")?,
        ])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let args = request.arguments.unwrap_or_default();
        match request.name.as_ref() {
            "list_plans" => {
                let _: NoArgs = parse_args(args)?;
                let plans = self.service.list_plans().await?;
                structured_result_with_text(&json!({ "count": plans.len(), "plans": plans }), None)
            }
            "list_buckets" => {
                let args: PlanRef = parse_args(args)?;
                let buckets = self.service.list_buckets(&args.plan_id).await?;
                structured_result_with_text(
                    &json!({ "count": buckets.len(), "buckets": buckets }),
                    None,
                )
            }
            "list_tasks" => {
                let args: ListTasksArgs = parse_args(args)?;
                let tasks = self
                    .service
                    .list_tasks(&args.plan_id, args.bucket_id.as_deref())
                    .await?;
                structured_result_with_text(&json!({ "count": tasks.len(), "tasks": tasks }), None)
            }
            "get_task" => {
                let args: TaskRef = parse_args(args)?;
                let task = self.service.get_task(&args.task_id).await?;
                structured_result_with_text(&task, None)
            }
            "create_task" => {
                let args: NewPlannerTask = parse_args(args)?;
                let task = self.service.create_task(args).await?;
                structured_result_with_text(&task, None)
            }
            "update_task" => {
                let args: UpdateTaskArgs = parse_args(args)?;
                let task = self.service.update_task(&args.task_id, args.update).await?;
                structured_result_with_text(&task, None)
            }
            "delete_task" => {
                let args: TaskRef = parse_args(args)?;
                self.service.delete_task(&args.task_id).await?;
                structured_result_with_text(&Deleted::new(&args.task_id), None)
            }
            other => Err(ConnectorError::ToolNotFound(other.to_string())),
        }
    }
}
