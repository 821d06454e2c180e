use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::error::{parse_args, ConnectorError};
use crate::models::{NewTodoTask, TodoTaskUpdate};
use crate::services::TodoService;
use crate::utils::{structured_result_with_text, tool};
use crate::Connector;

use super::{Deleted, NoArgs};

#[derive(Debug, Deserialize, JsonSchema)]
struct ListTasksArgs {
    /// Task list id, from list_task_lists
    list_id: String,
    /// OData filter over status, importance, title, dueDateTime, createdDateTime,
    /// lastModifiedDateTime, completedDateTime or isReminderOn,
    /// e.g. "status eq 'notStarted'"
    #[serde(default)]
    filter: Option<String>,
    /// Maximum number of tasks (1-100, default 25)
    #[serde(default)]
    top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TaskRef {
    list_id: String,
    task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateTaskArgs {
    list_id: String,
    #[serde(flatten)]
    task: NewTodoTask,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateTaskArgs {
    list_id: String,
    task_id: String,
    #[serde(flatten)]
    update: TodoTaskUpdate,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchTasksArgs {
    /// Text matched against task titles and notes
    query: String,
    /// Restrict the search to one list; all lists otherwise
    #[serde(default)]
    list_id: Option<String>,
}

pub struct TodoConnector {
    service: Arc<TodoService>,
}

impl TodoConnector {
    pub fn new(service: Arc<TodoService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Connector for TodoConnector {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn description(&self) -> &'static str {
        "Microsoft To Do task lists and tasks"
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ConnectorError> {
        Ok(vec![
            tool::<NoArgs>("list_task_lists", "List the signed-in user's To Do task lists")?,
            tool::<ListTasksArgs>(
                "list_tasks",
                "List tasks in a To Do list, optionally filtered with a restricted OData expression",
            )?,
            tool::<TaskRef>("get_task", "Get one To Do task")?,
            tool::<CreateTaskArgs>("create_task", "Create a task in a To Do list")?,
            tool::<UpdateTaskArgs>(
                "update_task",
                "Update fields of a To Do task; omitted fields are left unchanged",
            )?,
            tool::<TaskRef>("complete_task", "Mark a To Do task as completed")?,
            tool::<TaskRef>("delete_task", "Delete a To Do task")?,
            tool::<SearchTasksArgs>(
                "search_tasks",
                "Find To Do tasks whose title or notes contain the query text",
            )?,
        ])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let args = request.arguments.unwrap_or_default();
        match request.name.as_ref() {
            "list_task_lists" => {
                let _: NoArgs = parse_args(args)?;
                let lists = self.service.list_task_lists().await?;
                structured_result_with_text(&json!({ "count": lists.len(), "lists": lists }), None)
            }
            "list_tasks" => {
                let args: ListTasksArgs = parse_args(args)?;
                let tasks = self
                    .service
                    .list_tasks(&args.list_id, args.filter.as_deref(), args.top)
                    .await?;
                structured_result_with_text(&json!({ "count": tasks.len(), "tasks": tasks }), None)
            }
            "get_task" => {
                let args: TaskRef = parse_args(args)?;
                let task = self.service.get_task(&args.list_id, &args.task_id).await?;
                structured_result_with_text(&task, None)
            }
            "create_task" => {
                let args: CreateTaskArgs = parse_args(args)?;
                let task = self.service.create_task(&args.list_id, args.task).await?;
                structured_result_with_text(&task, None)
            }
            "update_task" => {
                let args: UpdateTaskArgs = parse_args(args)?;
                let task = self
                    .service
                    .update_task(&args.list_id, &args.task_id, args.update)
                    .await?;
                structured_result_with_text(&task, None)
            }
            "complete_task" => {
                let args: TaskRef = parse_args(args)?;
                let task = self
                    .service
                    .complete_task(&args.list_id, &args.task_id)
                    .await?;
                structured_result_with_text(&task, None)
            }
            "delete_task" => {
                let args: TaskRef = parse_args(args)?;
                self.service
                    .delete_task(&args.list_id, &args.task_id)
                    .await?;
                structured_result_with_text(&Deleted::new(&args.task_id), None)
            }
            "search_tasks" => {
                let args: SearchTasksArgs = parse_args(args)?;
                let tasks = self
                    .service
                    .search_tasks(&args.query, args.list_id.as_deref())
                    .await?;
                structured_result_with_text(&json!({ "count": tasks.len(), "tasks": tasks }), None)
            }
            other => Err(ConnectorError::ToolNotFound(other.to_string())),
        }
    }
}
