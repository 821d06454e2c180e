use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_context, CommandError, Result};
use crate::output::format_output;
use planbridge_core::mcp_server::McpServer;
use planbridge_core::CallToolRequestParam;
use serde_json::{Map, Value};

pub async fn run(cli: &Cli, tool: &str, args_json: Option<&str>) -> Result<()> {
    let arguments = parse_args_json(args_json)?;
    let ctx = load_context()?;
    let server = McpServer::from_context(&ctx);

    let result = server
        .handle_call_tool(CallToolRequestParam {
            name: tool.to_string().into(),
            arguments: Some(arguments),
        })
        .await;

    let payload = result.structured_content.unwrap_or(Value::Null);
    if result.is_error == Some(true) {
        let message = payload
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("Tool call failed")
            .to_string();
        if cli.output == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        return Err(CommandError::ToolFailed(message));
    }

    format_output(tool, &payload, cli.output)
}

fn parse_args_json(args_json: Option<&str>) -> Result<Map<String, Value>> {
    match args_json.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Map::new()),
        Some(s) => match serde_json::from_str::<Value>(s)? {
            Value::Object(m) => Ok(m),
            _ => Err(CommandError::InvalidArgs(
                "--args must be a JSON object".to_string(),
            )),
        },
    }
}
