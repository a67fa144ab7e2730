use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// j5 - run HTTP request descriptors with templated variables and script hooks
#[derive(Parser, Debug)]
#[command(name = "j5")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Variable scopes shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Environment file (JSON). Repeat for layering; later files are more specific
    #[arg(long = "env", value_name = "FILE")]
    pub env_files: Vec<PathBuf>,

    /// Override a variable for this invocation only (most specific layer)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a request descriptor and print the execution result as JSON
    Run {
        /// Path to the request descriptor (JSON)
        #[arg(value_name = "REQUEST_FILE")]
        request_file: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Write the resulting environment back into the --env files
        #[arg(long, default_value = "false")]
        save_env: bool,

        /// Script time limit in milliseconds (default: from env or 500)
        #[arg(long, value_name = "MS")]
        script_timeout_ms: Option<u64>,

        /// HTTP request timeout in seconds (default: from env or 30)
        #[arg(long, value_name = "SECS")]
        http_timeout: Option<u64>,

        /// Pretty-print the JSON output
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Resolve {{variable}} tokens in a template and print the result
    Resolve {
        /// Template text
        #[arg(value_name = "TEMPLATE")]
        template: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Run a script in the sandbox and print the resulting environment
    Script {
        /// Path to the script file
        #[arg(value_name = "SCRIPT_FILE")]
        script_file: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Script time limit in milliseconds (default: from env or 500)
        #[arg(long, value_name = "MS")]
        script_timeout_ms: Option<u64>,
    },
}

/// Parse `KEY=VALUE`. The value may itself contain `=`; the key may not be empty.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
