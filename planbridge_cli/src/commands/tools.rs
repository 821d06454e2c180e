use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_context, CommandError, Result};
use owo_colors::OwoColorize;
use planbridge_core::mcp_server::McpServer;
use serde_json::{json, Value};

pub async fn run(cli: &Cli, connector: Option<&str>) -> Result<()> {
    let ctx = load_context()?;
    if let Some(name) = connector {
        if name != "auth" && ctx.registry.get_provider(name).is_none() {
            return Err(CommandError::ConnectorNotFound(name.to_string()));
        }
    }

    let server = McpServer::from_context(&ctx);
    let tools = server.handle_list_tools(None)?.tools;
    let prefix = connector.map(|c| format!("{}/", c));
    let tools: Vec<_> = tools
        .into_iter()
        .filter(|t| prefix.as_deref().map_or(true, |p| t.name.starts_with(p)))
        .collect();

    match cli.output {
        OutputFormat::Json => {
            let list: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.input_schema.as_ref(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        OutputFormat::Pretty => {
            if connector.is_none() {
                println!();
                println!("{}", "Connectors".bold().cyan());
                for info in ctx.registry.list_providers() {
                    println!("  {:<10} {}", info.name.bold(), info.description.dimmed());
                }
            }
            println!();
            println!("{}", "Available tools".bold().cyan());
            println!();
            for tool in &tools {
                println!("  {}", tool.name.bold());
                if let Some(description) = &tool.description {
                    println!("    {}", description.dimmed());
                }
                let required = required_params(tool.input_schema.as_ref());
                if !required.is_empty() {
                    println!("    requires: {}", required.join(", ").yellow());
                }
            }
            println!();
        }
    }
    Ok(())
}

fn required_params(schema: &serde_json::Map<String, Value>) -> Vec<String> {
    schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
