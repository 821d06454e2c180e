use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::GraphError;
use crate::graph_client::{GraphClient, RequestOptions};
use crate::models::{
    graph_datetime, DateTimeTimeZone, GraphCollection, ItemBody, NewTodoTask, TaskStatus,
    TodoTask, TodoTaskList, TodoTaskUpdate,
};
use crate::sanitize::{sanitize_all, SanitizedTask, SanitizedTaskList};
use crate::validation::{
    validate_due_date, validate_id, validate_odata_filter, validate_search_query, validate_title,
};

use super::clamp_top;

/// Upper bound on tasks scanned per list by `search_tasks`.
const SEARCH_SCAN_LIMIT: u32 = 100;

pub struct TodoService {
    client: Arc<GraphClient>,
}

impl TodoService {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    pub async fn list_task_lists(&self) -> Result<Vec<SanitizedTaskList>, GraphError> {
        let lists: GraphCollection<TodoTaskList> = self
            .client
            .get("/me/todo/lists", RequestOptions::new())
            .await?;
        Ok(sanitize_all(lists.value))
    }

    pub async fn list_tasks(
        &self,
        list_id: &str,
        filter: Option<&str>,
        top: Option<u32>,
    ) -> Result<Vec<SanitizedTask>, GraphError> {
        let list_id = validate_id(list_id, "list_id")?;
        let mut options = RequestOptions::new().query("$top", clamp_top(top).to_string());
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            validate_odata_filter(filter)?;
            options = options.query("$filter", filter);
        }
        let tasks: GraphCollection<TodoTask> = self
            .client
            .get(&format!("/me/todo/lists/{}/tasks", list_id), options)
            .await?;
        Ok(sanitize_all(tasks.value))
    }

    pub async fn get_task(&self, list_id: &str, task_id: &str) -> Result<SanitizedTask, GraphError> {
        let path = task_path(list_id, task_id)?;
        let task: TodoTask = self.client.get(&path, RequestOptions::new()).await?;
        Ok(task.into())
    }

    pub async fn create_task(
        &self,
        list_id: &str,
        task: NewTodoTask,
    ) -> Result<SanitizedTask, GraphError> {
        let list_id = validate_id(list_id, "list_id")?;
        let title = validate_title(&task.title)?;

        let mut body = Map::new();
        body.insert("title".into(), json!(title));
        if let Some(content) = task.body.filter(|b| !b.trim().is_empty()) {
            body.insert("body".into(), json!(ItemBody::text(content)));
        }
        if let Some(due) = &task.due_date {
            body.insert("dueDateTime".into(), due_date_value(due)?);
        }
        if let Some(importance) = task.importance {
            body.insert("importance".into(), json!(importance));
        }
        if let Some(categories) = task.categories {
            body.insert("categories".into(), json!(validate_categories(categories)?));
        }

        let created: TodoTask = self
            .client
            .post(
                &format!("/me/todo/lists/{}/tasks", list_id),
                &Value::Object(body),
                RequestOptions::new(),
            )
            .await?;
        Ok(created.into())
    }

    pub async fn update_task(
        &self,
        list_id: &str,
        task_id: &str,
        update: TodoTaskUpdate,
    ) -> Result<SanitizedTask, GraphError> {
        let path = task_path(list_id, task_id)?;
        if update.is_empty() {
            return Err(GraphError::validation("No fields to update"));
        }

        let mut body = Map::new();
        if let Some(title) = &update.title {
            body.insert("title".into(), json!(validate_title(title)?));
        }
        if let Some(content) = update.body {
            body.insert("body".into(), json!(ItemBody::text(content)));
        }
        if let Some(due) = &update.due_date {
            body.insert("dueDateTime".into(), due_date_value(due)?);
        }
        if let Some(importance) = update.importance {
            body.insert("importance".into(), json!(importance));
        }
        if let Some(status) = update.status {
            body.insert("status".into(), json!(status));
        }
        if let Some(categories) = update.categories {
            body.insert("categories".into(), json!(validate_categories(categories)?));
        }

        let updated: Value = self
            .client
            .patch(&path, &Value::Object(body), RequestOptions::new())
            .await?;
        // An empty 204 reply carries no task; read it back.
        if updated.as_object().map_or(true, Map::is_empty) {
            return self.get_task(list_id, task_id).await;
        }
        let task: TodoTask = serde_json::from_value(updated)
            .map_err(|e| GraphError::api(format!("Unexpected Graph response shape: {}", e), None))?;
        Ok(task.into())
    }

    pub async fn complete_task(
        &self,
        list_id: &str,
        task_id: &str,
    ) -> Result<SanitizedTask, GraphError> {
        self.update_task(
            list_id,
            task_id,
            TodoTaskUpdate {
                status: Some(TaskStatus::Completed),
                ..TodoTaskUpdate::default()
            },
        )
        .await
    }

    pub async fn delete_task(&self, list_id: &str, task_id: &str) -> Result<(), GraphError> {
        let path = task_path(list_id, task_id)?;
        self.client.delete(&path, RequestOptions::new()).await
    }

    /// Case-insensitive match over title and notes. The query never reaches
    /// an OData expression; matching happens locally.
    pub async fn search_tasks(
        &self,
        query: &str,
        list_id: Option<&str>,
    ) -> Result<Vec<SanitizedTask>, GraphError> {
        let needle = validate_search_query(query)?.to_lowercase();

        let list_ids: Vec<String> = match list_id {
            Some(id) => vec![validate_id(id, "list_id")?.to_string()],
            None => self
                .list_task_lists()
                .await?
                .into_iter()
                .map(|list| list.id)
                .collect(),
        };

        let mut matches = Vec::new();
        for id in &list_ids {
            let tasks = self.list_tasks(id, None, Some(SEARCH_SCAN_LIMIT)).await?;
            matches.extend(tasks.into_iter().filter(|task| {
                task.title.to_lowercase().contains(&needle)
                    || task
                        .body
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            }));
        }
        Ok(matches)
    }
}

fn task_path(list_id: &str, task_id: &str) -> Result<String, GraphError> {
    let list_id = validate_id(list_id, "list_id")?;
    let task_id = validate_id(task_id, "task_id")?;
    Ok(format!("/me/todo/lists/{}/tasks/{}", list_id, task_id))
}

fn due_date_value(input: &str) -> Result<Value, GraphError> {
    let due = validate_due_date(input)?;
    Ok(json!(DateTimeTimeZone::utc(graph_datetime(&due))))
}

fn validate_categories(categories: Vec<String>) -> Result<Vec<String>, GraphError> {
    categories
        .into_iter()
        .map(|c| validate_title(&c).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| GraphError::validation("Invalid category name"))
}
