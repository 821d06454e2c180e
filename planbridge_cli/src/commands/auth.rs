use std::time::{Duration, Instant};

use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_context, Result};
use crate::output::format_output;
use owo_colors::OwoColorize;
use serde_json::json;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP_SECS: u64 = 5;

pub async fn login(cli: &Cli, no_wait: bool) -> Result<()> {
    let ctx = load_context()?;
    let start = ctx.auth.start_device().await?;

    match cli.output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "userCode": start.user_code,
                    "verificationUri": start.verification_uri,
                    "expiresIn": start.expires_in,
                }))?
            );
        }
        OutputFormat::Pretty => {
            println!();
            println!("{}", "Microsoft sign-in".bold().cyan());
            println!();
            println!("  1. Open {}", start.verification_uri.underline());
            println!("  2. Enter the code {}", start.user_code.bold().yellow());
            println!();
        }
    }

    if no_wait {
        return Ok(());
    }

    let mut interval = start
        .interval
        .and_then(|secs| u64::try_from(secs).ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    let deadline = Instant::now() + Duration::from_secs(u64::try_from(start.expires_in).unwrap_or(900));

    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;
        if Instant::now() >= deadline {
            return Err(planbridge_core::GraphError::authentication(
                "Sign-in code expired. Run `planbridge login` again",
            )
            .into());
        }
        let status = ctx.auth.poll_device(None).await?;
        match status.status.as_str() {
            "complete" => {
                if cli.output == OutputFormat::Pretty {
                    println!("{} {}", "✓".green(), status.message);
                }
                return Ok(());
            }
            "slow_down" => interval += SLOW_DOWN_STEP_SECS,
            _ => {
                if cli.output == OutputFormat::Pretty {
                    eprint!("{}", ".".dimmed());
                }
            }
        }
    }
}

pub async fn logout(cli: &Cli) -> Result<()> {
    let ctx = load_context()?;
    ctx.auth.logout()?;
    match cli.output {
        OutputFormat::Json => println!("{}", json!({ "signedOut": true })),
        OutputFormat::Pretty => println!("{} Signed out", "✓".green()),
    }
    Ok(())
}

pub async fn status(cli: &Cli) -> Result<()> {
    let ctx = load_context()?;
    let auth = ctx.auth.status()?;
    let health = ctx.client.health();
    let value = json!({
        "auth": auth,
        "circuitState": health.circuit_state,
        "availableTokens": health.available_tokens,
        "capacity": health.capacity,
        "clientIdConfigured": ctx.config.auth.client_id.is_some(),
    });
    format_output("Status", &value, cli.output)?;
    if cli.output == OutputFormat::Pretty && !auth.signed_in {
        println!("Run {} to sign in.", "planbridge login".cyan());
    }
    Ok(())
}
