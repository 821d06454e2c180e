use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "planbridge")]
#[command(about = "planbridge - Microsoft To Do, Planner and Calendar from the command line")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  planbridge login                                Sign in with a device code
  planbridge status                               Show sign-in and client health
  planbridge tools                                List every tool
  planbridge call todo/list_task_lists            Call a tool
  planbridge call todo/list_tasks --args '{\"list_id\":\"AAMk...\"}'

\x1b[1;36mConfiguration:\x1b[0m
  planbridge config show                          Effective configuration
  planbridge config init                          Write a default config.toml")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in to Microsoft Graph with the device-code flow
    Login {
        /// Print the code and exit instead of waiting for sign-in to finish
        #[arg(long)]
        no_wait: bool,
    },

    /// Forget stored credentials
    Logout,

    /// Show sign-in state, circuit state and available request tokens
    Status,

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List tools, optionally only those of one connector (todo, planner, calendar)
    Tools {
        connector: Option<String>,
    },

    /// Call a tool by its full name, e.g. todo/list_tasks
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  planbridge call planner/list_plans
  planbridge call calendar/list_events --args '{\"start\":\"2026-10-01\",\"end\":\"2026-10-31\"}'")]
    Call {
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file location
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
}
