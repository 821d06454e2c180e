use crate::cli::OutputFormat;
use crate::commands::Result;
use owo_colors::OwoColorize;
use serde_json::Value;

/// Print `value` as JSON, or as an indented key/value listing for humans.
pub fn format_output(title: &str, value: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            println!();
            println!("{}", title.bold().cyan());
            println!();
            print_pretty(value, 1);
            println!();
        }
    }
    Ok(())
}

fn print_pretty(value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::Object(_) | Value::Array(_) if !is_empty(v) => {
                        println!("{}{}:", indent, key.bold());
                        print_pretty(v, depth + 1);
                    }
                    _ => println!("{}{}: {}", indent, key.bold(), scalar(v)),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                println!("{}{}", indent, format!("[{}]", i).dimmed());
                print_pretty(item, depth + 1);
            }
        }
        other => println!("{}{}", indent, scalar(other)),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".dimmed().to_string(),
        Value::Bool(true) => "yes".green().to_string(),
        Value::Bool(false) => "no".yellow().to_string(),
        Value::Array(_) => "[]".dimmed().to_string(),
        Value::Object(_) => "{}".dimmed().to_string(),
        other => other.to_string(),
    }
}
