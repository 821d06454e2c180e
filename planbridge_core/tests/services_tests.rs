mod common;

use serde_json::{json, Value};

use common::{client, ok, ScriptedTransport};
use planbridge_core::http::{HttpResponse, Method};
use planbridge_core::models::{
    NewEvent, NewPlannerTask, NewTodoTask, PlannerPriority, PlannerTaskUpdate, TodoTaskUpdate,
};
use planbridge_core::services::{CalendarService, PlannerService, TodoService};

fn query_of(transport: &ScriptedTransport, index: usize) -> Vec<(String, String)> {
    transport
        .request(index)
        .url
        .query_pairs()
        .into_owned()
        .collect()
}

fn graph_task(id: &str, title: &str) -> Value {
    json!({
        "@odata.etag": "W/\"abc\"",
        "id": id,
        "title": title,
        "status": "notStarted",
        "importance": "normal",
        "body": {"content": "", "contentType": "text"}
    })
}

mod todo {
    use super::*;

    #[tokio::test]
    async fn list_tasks_sends_top_and_filter() {
        let transport = ScriptedTransport::new(vec![ok(json!({
            "value": [graph_task("t1", "Buy milk")]
        }))]);
        let service = TodoService::new(client(transport.clone()));

        let tasks = service
            .list_tasks("list-1", Some("status eq 'notStarted'"), Some(500))
            .await
            .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
        assert_eq!(
            transport.request(0).url.path(),
            "/v1.0/me/todo/lists/list-1/tasks"
        );
        assert_eq!(
            query_of(&transport, 0),
            vec![
                ("$top".to_string(), "100".to_string()),
                ("$filter".to_string(), "status eq 'notStarted'".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_filter_never_reaches_graph() {
        let transport = ScriptedTransport::always(ok(json!({"value": []})));
        let service = TodoService::new(client(transport.clone()));

        let err = service
            .list_tasks("list-1", Some("title eq 'x'; drop"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");

        let err = service
            .list_tasks("../secrets", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn create_task_builds_graph_body() {
        let transport = ScriptedTransport::new(vec![HttpResponse::json(
            201,
            &graph_task("new-1", "Write report"),
        )]);
        let service = TodoService::new(client(transport.clone()));

        let created = service
            .create_task(
                "list-1",
                NewTodoTask {
                    title: "  Write report ".to_string(),
                    body: Some("Quarterly numbers".to_string()),
                    due_date: Some("2026-01-15".to_string()),
                    ..NewTodoTask::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "new-1");
        // Empty notes are dropped from the projection.
        assert!(created.body.is_none());

        let request = transport.request(0);
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            transport.body_json(0),
            json!({
                "title": "Write report",
                "body": {"content": "Quarterly numbers", "contentType": "text"},
                "dueDateTime": {"dateTime": "2026-01-15T00:00:00.000", "timeZone": "UTC"}
            })
        );
    }

    #[tokio::test]
    async fn empty_update_is_rejected_locally() {
        let transport = ScriptedTransport::always(ok(json!({})));
        let service = TodoService::new(client(transport.clone()));
        let err = service
            .update_task("list-1", "t1", TodoTaskUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No fields to update");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn no_content_update_reads_the_task_back() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::new(204, ""),
            ok(graph_task("t1", "Renamed")),
        ]);
        let service = TodoService::new(client(transport.clone()));

        let task = service
            .update_task(
                "list-1",
                "t1",
                TodoTaskUpdate {
                    title: Some("Renamed".to_string()),
                    ..TodoTaskUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(task.title, "Renamed");
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.request(0).method, Method::Patch);
        assert_eq!(transport.request(1).method, Method::Get);
    }

    #[tokio::test]
    async fn complete_task_patches_status() {
        let mut done = graph_task("t1", "Buy milk");
        done["status"] = json!("completed");
        let transport = ScriptedTransport::new(vec![ok(done)]);
        let service = TodoService::new(client(transport.clone()));

        let task = service.complete_task("list-1", "t1").await.unwrap();
        assert_eq!(task.status.as_deref(), Some("completed"));
        assert_eq!(transport.body_json(0), json!({"status": "completed"}));
    }

    #[tokio::test]
    async fn search_matches_locally() {
        let transport = ScriptedTransport::new(vec![
            ok(json!({"value": [
                {"id": "l1", "displayName": "Tasks"},
                {"id": "l2", "displayName": "Groceries"}
            ]})),
            ok(json!({"value": [graph_task("a", "Call the bank")]})),
            ok(json!({"value": [
                graph_task("b", "Milk"),
                {"id": "c", "title": "Bread", "body": {"content": "ask the BANK about bread"}}
            ]})),
        ]);
        let service = TodoService::new(client(transport.clone()));

        let found = service.search_tasks("bank", None).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        // The query text never becomes part of an OData expression.
        for request in transport.requests() {
            assert!(!request.url.as_str().contains("bank"));
        }
    }

    #[tokio::test]
    async fn search_rejects_shell_metacharacters() {
        let transport = ScriptedTransport::always(ok(json!({"value": []})));
        let service = TodoService::new(client(transport.clone()));
        let err = service.search_tasks("milk; rm -rf", None).await.unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(transport.call_count(), 0);
    }
}

mod planner {
    use super::*;

    fn planner_task(etag: &str) -> Value {
        json!({
            "@odata.etag": etag,
            "id": "pt1",
            "planId": "plan-1",
            "bucketId": "b1",
            "title": "Draft agenda",
            "percentComplete": 50,
            "priority": 1,
            "orderHint": "8585",
            "assignments": {"user-a": {}, "user-b": {}}
        })
    }

    #[tokio::test]
    async fn update_sends_current_etag() {
        let transport = ScriptedTransport::new(vec![
            ok(planner_task("W/\"v1\"")),
            HttpResponse::new(204, ""),
            ok(planner_task("W/\"v2\"")),
        ]);
        let service = PlannerService::new(client(transport.clone()));

        let task = service
            .update_task(
                "pt1",
                PlannerTaskUpdate {
                    percent_complete: Some(100),
                    ..PlannerTaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(task.id, "pt1");

        assert_eq!(transport.call_count(), 3);
        let patch = transport.request(1);
        assert_eq!(patch.method, Method::Patch);
        assert_eq!(patch.header("If-Match"), Some("W/\"v1\""));
        assert_eq!(transport.body_json(1), json!({"percentComplete": 100}));
    }

    #[tokio::test]
    async fn invalid_percent_is_rejected_before_any_request() {
        let transport = ScriptedTransport::always(ok(planner_task("W/\"v1\"")));
        let service = PlannerService::new(client(transport.clone()));
        let err = service
            .update_task(
                "pt1",
                PlannerTaskUpdate {
                    percent_complete: Some(75),
                    ..PlannerTaskUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn delete_is_conditional() {
        let transport = ScriptedTransport::new(vec![
            ok(planner_task("W/\"v7\"")),
            HttpResponse::new(204, ""),
        ]);
        let service = PlannerService::new(client(transport.clone()));

        service.delete_task("pt1").await.unwrap();
        let delete = transport.request(1);
        assert_eq!(delete.method, Method::Delete);
        assert_eq!(delete.header("If-Match"), Some("W/\"v7\""));
    }

    #[tokio::test]
    async fn missing_etag_refuses_the_write() {
        let mut task = planner_task("");
        task.as_object_mut().unwrap().remove("@odata.etag");
        let transport = ScriptedTransport::new(vec![ok(task)]);
        let service = PlannerService::new(client(transport.clone()));

        let err = service.delete_task("pt1").await.unwrap_err();
        assert_eq!(err.kind_name(), "GraphAPIError");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn projection_hides_bookkeeping() {
        let transport = ScriptedTransport::new(vec![ok(planner_task("W/\"v1\""))]);
        let service = PlannerService::new(client(transport));

        let task = service.get_task("pt1").await.unwrap();
        assert_eq!(task.priority, PlannerPriority::Urgent);
        assert_eq!(task.assignee_count, 2);

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["priority"], "urgent");
        assert!(value.get("@odata.etag").is_none());
        assert!(value.get("orderHint").is_none());
        assert!(value.get("assignments").is_none());
    }

    #[tokio::test]
    async fn create_maps_priority_and_due_date() {
        let transport = ScriptedTransport::new(vec![HttpResponse::json(201, &planner_task("W/\"v1\""))]);
        let service = PlannerService::new(client(transport.clone()));

        service
            .create_task(NewPlannerTask {
                plan_id: "plan-1".to_string(),
                bucket_id: Some("b1".to_string()),
                title: "Draft agenda".to_string(),
                due_date: Some("2026-01-15".to_string()),
                priority: Some(PlannerPriority::High),
            })
            .await
            .unwrap();

        assert_eq!(transport.request(0).url.path(), "/v1.0/planner/tasks");
        assert_eq!(
            transport.body_json(0),
            json!({
                "planId": "plan-1",
                "title": "Draft agenda",
                "bucketId": "b1",
                "dueDateTime": "2026-01-15T00:00:00Z",
                "priority": 3
            })
        );
    }

    #[tokio::test]
    async fn bucket_listing_drops_tasks_from_other_plans() {
        let mut foreign = planner_task("W/\"v1\"");
        foreign["id"] = json!("pt2");
        foreign["planId"] = json!("plan-2");
        let transport = ScriptedTransport::new(vec![ok(json!({
            "value": [planner_task("W/\"v1\""), foreign]
        }))]);
        let service = PlannerService::new(client(transport.clone()));

        let tasks = service.list_tasks("plan-1", Some("b1")).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "pt1");
        assert_eq!(
            transport.request(0).url.path(),
            "/v1.0/planner/buckets/b1/tasks"
        );
    }
}

mod calendar {
    use super::*;

    #[tokio::test]
    async fn list_events_uses_calendar_view() {
        let transport = ScriptedTransport::new(vec![ok(json!({"value": [{
            "id": "e1",
            "subject": "Standup",
            "start": {"dateTime": "2025-03-03T09:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-03-03T09:15:00.0000000", "timeZone": "UTC"},
            "attendees": [{"emailAddress": {"address": "a@contoso.com"}}],
            "changeKey": "ck"
        }]}))]);
        let service = CalendarService::new(client(transport.clone()));

        let events = service
            .list_events("2025-03-01", "2025-03-08", None)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start.as_deref(), Some("2025-03-03T09:00:00.0000000"));
        assert_eq!(events[0].attendee_count, 1);

        let request = transport.request(0);
        assert_eq!(request.url.path(), "/v1.0/me/calendarView");
        assert_eq!(request.header("Prefer"), Some("outlook.timezone=\"UTC\""));
        let query = query_of(&transport, 0);
        assert!(query.contains(&(
            "startDateTime".to_string(),
            "2025-03-01T00:00:00+00:00".to_string()
        )));
        assert!(query.contains(&("$top".to_string(), "25".to_string())));
    }

    #[tokio::test]
    async fn oversized_range_is_rejected() {
        let transport = ScriptedTransport::always(ok(json!({"value": []})));
        let service = CalendarService::new(client(transport.clone()));
        let err = service
            .list_events("2025-01-01", "2026-06-01", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_inverted_range() {
        let transport = ScriptedTransport::always(ok(json!({})));
        let service = CalendarService::new(client(transport.clone()));
        let err = service
            .create_event(NewEvent {
                subject: "Review".to_string(),
                start: "2025-03-03T10:00:00Z".to_string(),
                end: "2025-03-03T09:00:00Z".to_string(),
                ..NewEvent::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "End date must be after start date");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn create_sends_utc_wrappers() {
        let transport = ScriptedTransport::new(vec![HttpResponse::json(
            201,
            &json!({"id": "e9", "subject": "Review"}),
        )]);
        let service = CalendarService::new(client(transport.clone()));

        let event = service
            .create_event(NewEvent {
                subject: "Review".to_string(),
                start: "2025-03-03T11:00:00+02:00".to_string(),
                end: "2025-03-03T12:00:00+02:00".to_string(),
                location: Some("Room 4".to_string()),
                ..NewEvent::default()
            })
            .await
            .unwrap();
        assert_eq!(event.id, "e9");
        assert_eq!(
            transport.body_json(0),
            json!({
                "subject": "Review",
                "start": {"dateTime": "2025-03-03T09:00:00.000", "timeZone": "UTC"},
                "end": {"dateTime": "2025-03-03T10:00:00.000", "timeZone": "UTC"},
                "location": {"displayName": "Room 4"}
            })
        );
    }
}
