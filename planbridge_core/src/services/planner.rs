use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::error::GraphError;
use crate::graph_client::{GraphClient, RequestOptions};
use crate::models::{
    GraphCollection, NewPlannerTask, PlannerBucket, PlannerPlan, PlannerTask, PlannerTaskUpdate,
};
use crate::sanitize::{sanitize_all, SanitizedBucket, SanitizedPlan, SanitizedPlannerTask};
use crate::validation::{validate_due_date, validate_id, validate_percent_complete, validate_title};

pub struct PlannerService {
    client: Arc<GraphClient>,
}

impl PlannerService {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    pub async fn list_plans(&self) -> Result<Vec<SanitizedPlan>, GraphError> {
        let plans: GraphCollection<PlannerPlan> = self
            .client
            .get("/me/planner/plans", RequestOptions::new())
            .await?;
        Ok(sanitize_all(plans.value))
    }

    pub async fn list_buckets(&self, plan_id: &str) -> Result<Vec<SanitizedBucket>, GraphError> {
        let plan_id = validate_id(plan_id, "plan_id")?;
        let buckets: GraphCollection<PlannerBucket> = self
            .client
            .get(&format!("/planner/plans/{}/buckets", plan_id), RequestOptions::new())
            .await?;
        Ok(sanitize_all(buckets.value))
    }

    /// Tasks of a plan, or of a single bucket when `bucket_id` is given.
    pub async fn list_tasks(
        &self,
        plan_id: &str,
        bucket_id: Option<&str>,
    ) -> Result<Vec<SanitizedPlannerTask>, GraphError> {
        let plan_id = validate_id(plan_id, "plan_id")?;
        let path = match bucket_id {
            Some(bucket) => format!("/planner/buckets/{}/tasks", validate_id(bucket, "bucket_id")?),
            None => format!("/planner/plans/{}/tasks", plan_id),
        };
        let tasks: GraphCollection<PlannerTask> =
            self.client.get(&path, RequestOptions::new()).await?;
        Ok(tasks
            .value
            .into_iter()
            .filter(|task| task.plan_id.is_empty() || task.plan_id == plan_id)
            .map(SanitizedPlannerTask::from)
            .collect())
    }

    pub async fn get_task(&self, task_id: &str) -> Result<SanitizedPlannerTask, GraphError> {
        Ok(self.fetch_task(task_id).await?.into())
    }

    pub async fn create_task(
        &self,
        task: NewPlannerTask,
    ) -> Result<SanitizedPlannerTask, GraphError> {
        let plan_id = validate_id(&task.plan_id, "plan_id")?;
        let title = validate_title(&task.title)?;

        let mut body = Map::new();
        body.insert("planId".into(), json!(plan_id));
        body.insert("title".into(), json!(title));
        if let Some(bucket) = &task.bucket_id {
            body.insert("bucketId".into(), json!(validate_id(bucket, "bucket_id")?));
        }
        if let Some(due) = &task.due_date {
            body.insert("dueDateTime".into(), json!(due_date_offset(due)?));
        }
        if let Some(priority) = task.priority {
            body.insert("priority".into(), json!(priority.code()));
        }

        let created: PlannerTask = self
            .client
            .post("/planner/tasks", &Value::Object(body), RequestOptions::new())
            .await?;
        Ok(created.into())
    }

    /// Planner rejects writes without the current etag, so it is fetched
    /// first and sent as `If-Match`.
    pub async fn update_task(
        &self,
        task_id: &str,
        update: PlannerTaskUpdate,
    ) -> Result<SanitizedPlannerTask, GraphError> {
        let task_id = validate_id(task_id, "task_id")?;
        if update.is_empty() {
            return Err(GraphError::validation("No fields to update"));
        }

        let mut body = Map::new();
        if let Some(title) = &update.title {
            body.insert("title".into(), json!(validate_title(title)?));
        }
        if let Some(bucket) = &update.bucket_id {
            body.insert("bucketId".into(), json!(validate_id(bucket, "bucket_id")?));
        }
        if let Some(percent) = update.percent_complete {
            body.insert("percentComplete".into(), json!(validate_percent_complete(percent)?));
        }
        if let Some(priority) = update.priority {
            body.insert("priority".into(), json!(priority.code()));
        }
        if let Some(due) = &update.due_date {
            body.insert("dueDateTime".into(), json!(due_date_offset(due)?));
        }

        let etag = self.current_etag(task_id).await?;
        let updated: Value = self
            .client
            .patch(
                &format!("/planner/tasks/{}", task_id),
                &Value::Object(body),
                RequestOptions::new()
                    .if_match(etag)
                    .header("Prefer", "return=representation"),
            )
            .await?;

        if updated.as_object().map_or(true, Map::is_empty) {
            return self.get_task(task_id).await;
        }
        let task: PlannerTask = serde_json::from_value(updated)
            .map_err(|e| GraphError::api(format!("Unexpected Graph response shape: {}", e), None))?;
        Ok(task.into())
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), GraphError> {
        let task_id = validate_id(task_id, "task_id")?;
        let etag = self.current_etag(task_id).await?;
        self.client
            .delete(
                &format!("/planner/tasks/{}", task_id),
                RequestOptions::new().if_match(etag),
            )
            .await
    }

    async fn fetch_task(&self, task_id: &str) -> Result<PlannerTask, GraphError> {
        let task_id = validate_id(task_id, "task_id")?;
        self.client
            .get(&format!("/planner/tasks/{}", task_id), RequestOptions::new())
            .await
    }

    async fn current_etag(&self, task_id: &str) -> Result<String, GraphError> {
        self.fetch_task(task_id)
            .await?
            .etag
            .filter(|etag| !etag.is_empty())
            .ok_or_else(|| {
                GraphError::api("Planner task has no etag; refusing an unconditional write", None)
            })
    }
}

fn due_date_offset(input: &str) -> Result<String, GraphError> {
    Ok(validate_due_date(input)?.to_rfc3339_opts(SecondsFormat::Secs, true))
}
