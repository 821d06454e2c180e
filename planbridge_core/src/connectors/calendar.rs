use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::error::{parse_args, ConnectorError};
use crate::models::NewEvent;
use crate::services::CalendarService;
use crate::utils::{structured_result_with_text, tool};
use crate::Connector;

use super::Deleted;

#[derive(Debug, Deserialize, JsonSchema)]
struct ListEventsArgs {
    /// Window start, YYYY-MM-DD or ISO 8601 date-time
    start: String,
    /// Window end; at most 365 days after start
    end: String,
    /// Maximum number of events (1-100, default 25)
    #[serde(default)]
    top: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EventRef {
    event_id: String,
}

pub struct CalendarConnector {
    service: Arc<CalendarService>,
}

impl CalendarConnector {
    pub fn new(service: Arc<CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Connector for CalendarConnector {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn description(&self) -> &'static str {
        "Microsoft Outlook calendar events"
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ConnectorError> {
        Ok(vec![
            tool::<ListEventsArgs>(
                "list_events",
                "List calendar events in a time window, with recurring events expanded",
            )?,
            tool::<EventRef>("get_event", "Get one calendar event")?,
            tool::<NewEvent>("create_event", "Create an event on the default calendar")?,
            tool::<EventRef>("delete_event", "Delete a calendar event")?,
        ])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let args = request.arguments.unwrap_or_default();
        match request.name.as_ref() {
            "list_events" => {
                let args: ListEventsArgs = parse_args(args)?;
                let events = self
                    .service
                    .list_events(&args.start, &args.end, args.top)
                    .await?;
                structured_result_with_text(
                    &json!({ "count": events.len(), "events": events }),
                    None,
                )
            }
            "get_event" => {
                let args: EventRef = parse_args(args)?;
                let event = self.service.get_event(&args.event_id).await?;
                structured_result_with_text(&event, None)
            }
            "create_event" => {
                let args: NewEvent = parse_args(args)?;
                let event = self.service.create_event(args).await?;
                structured_result_with_text(&event, None)
            }
            "delete_event" => {
                let args: EventRef = parse_args(args)?;
                self.service.delete_event(&args.event_id).await?;
                structured_result_with_text(&Deleted::new(&args.event_id), None)
            }
            other => Err(ConnectorError::ToolNotFound(other.to_string())),
        }
    }
}
