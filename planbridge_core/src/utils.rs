use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::ConnectorError;
use crate::sanitize::SanitizedError;

/// Successful tool result: the payload as structured content plus a JSON
/// text rendering for clients that ignore `structuredContent`.
pub fn structured_result_with_text<T: Serialize>(
    data: &T,
    text: Option<String>,
) -> Result<CallToolResult, ConnectorError> {
    let value = serde_json::to_value(data)?;

    // Convert to an object map; if it's not an object, wrap under a `data` key.
    let map: JsonMap<String, JsonValue> = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };

    let text = match text {
        Some(text) => text,
        None => serde_json::to_string(&map)?,
    };

    Ok(CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(JsonValue::Object(map)),
        is_error: Some(false),
        meta: None,
    })
}

/// Failed tool result carrying only sanitized error content.
pub fn error_result(error: &SanitizedError) -> CallToolResult {
    let value = serde_json::to_value(error).unwrap_or_else(|_| {
        serde_json::json!({ "error": crate::sanitize::GENERIC_ERROR_MESSAGE })
    });
    CallToolResult {
        content: vec![Content::text(value.to_string())],
        structured_content: Some(value),
        is_error: Some(true),
        meta: None,
    }
}

/// JSON Schema object for a tool's argument struct.
pub fn schema_object<T: JsonSchema>() -> Result<Arc<JsonObject>, ConnectorError> {
    let schema = serde_json::to_value(schemars::schema_for!(T))?;
    match schema {
        JsonValue::Object(mut map) => {
            map.remove("$schema");
            map.remove("title");
            Ok(Arc::new(map))
        }
        _ => Err(ConnectorError::Internal(
            "schema is not a JSON object".to_string(),
        )),
    }
}

pub fn tool<T: JsonSchema>(
    name: &'static str,
    description: &'static str,
) -> Result<Tool, ConnectorError> {
    Ok(Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: schema_object::<T>()?,
        output_schema: None,
        annotations: None,
        icons: None,
    })
}
