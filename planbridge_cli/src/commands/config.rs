use crate::cli::{Cli, ConfigAction, OutputFormat};
use crate::commands::{CommandError, Result};
use owo_colors::OwoColorize;
use planbridge_core::config::Config;
use serde_json::json;

pub async fn run(cli: &Cli, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(cli),
        ConfigAction::Path => {
            let path = Config::resolved_path();
            match cli.output {
                OutputFormat::Json => println!(
                    "{}",
                    json!({ "path": path.display().to_string(), "exists": path.exists() })
                ),
                OutputFormat::Pretty => println!("{}", path.display()),
            }
            Ok(())
        }
        ConfigAction::Init { force } => init_config(force),
    }
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = Config::load_default()?;
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Pretty => {
            let path = Config::resolved_path();
            println!();
            println!("{}", "Effective configuration".bold().cyan());
            if path.exists() {
                println!("Config file: {}", path.display().dimmed());
            } else {
                println!("{}", "No config file; showing defaults".yellow());
            }
            println!();
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = Config::resolved_path();
    if path.exists() && !force {
        return Err(CommandError::InvalidArgs(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default().to_toml_string()?)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}
