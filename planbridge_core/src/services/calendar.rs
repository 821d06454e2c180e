use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::GraphError;
use crate::graph_client::{GraphClient, RequestOptions};
use crate::models::{graph_datetime, CalendarEvent, DateTimeTimeZone, GraphCollection, ItemBody, NewEvent};
use crate::sanitize::{sanitize_all, SanitizedEvent};
use crate::validation::{validate_date_range, validate_id, validate_title};

use super::clamp_top;

pub struct CalendarService {
    client: Arc<GraphClient>,
}

impl CalendarService {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    /// Events overlapping `[start, end)`, expanded through `calendarView` so
    /// recurring series show up as individual occurrences.
    pub async fn list_events(
        &self,
        start: &str,
        end: &str,
        top: Option<u32>,
    ) -> Result<Vec<SanitizedEvent>, GraphError> {
        let (start, end) = validate_date_range(start, end)?;
        let options = RequestOptions::new()
            .query("startDateTime", start.to_rfc3339())
            .query("endDateTime", end.to_rfc3339())
            .query("$top", clamp_top(top).to_string())
            .query("$orderby", "start/dateTime")
            .header("Prefer", "outlook.timezone=\"UTC\"");
        let events: GraphCollection<CalendarEvent> =
            self.client.get("/me/calendarView", options).await?;
        Ok(sanitize_all(events.value))
    }

    pub async fn get_event(&self, event_id: &str) -> Result<SanitizedEvent, GraphError> {
        let event_id = validate_id(event_id, "event_id")?;
        let event: CalendarEvent = self
            .client
            .get(&format!("/me/events/{}", event_id), RequestOptions::new())
            .await?;
        Ok(event.into())
    }

    pub async fn create_event(&self, event: NewEvent) -> Result<SanitizedEvent, GraphError> {
        let subject = validate_title(&event.subject)?;
        let (start, end) = validate_date_range(&event.start, &event.end)?;

        let mut body = Map::new();
        body.insert("subject".into(), json!(subject));
        body.insert("start".into(), json!(DateTimeTimeZone::utc(graph_datetime(&start))));
        body.insert("end".into(), json!(DateTimeTimeZone::utc(graph_datetime(&end))));
        if let Some(content) = event.body.filter(|b| !b.trim().is_empty()) {
            body.insert("body".into(), json!(ItemBody::text(content)));
        }
        if let Some(location) = &event.location {
            body.insert(
                "location".into(),
                json!({ "displayName": validate_title(location)? }),
            );
        }
        if let Some(all_day) = event.is_all_day {
            body.insert("isAllDay".into(), json!(all_day));
        }

        let created: CalendarEvent = self
            .client
            .post("/me/events", &Value::Object(body), RequestOptions::new())
            .await?;
        Ok(created.into())
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), GraphError> {
        let event_id = validate_id(event_id, "event_id")?;
        self.client
            .delete(&format!("/me/events/{}", event_id), RequestOptions::new())
            .await
    }
}
