mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    j5_core::config::load_dotenv();
    j5_core::observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request_file,
            scope,
            save_env,
            script_timeout_ms,
            http_timeout,
            pretty,
        } => {
            let options = commands::run::RunOptions {
                save_env,
                script_timeout_ms,
                http_timeout,
                pretty,
            };
            let success = commands::run::cmd_run(&request_file, &scope, &options)?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Resolve { template, scope } => {
            println!("{}", commands::resolve::cmd_resolve(&template, &scope)?);
        }
        Commands::Script {
            script_file,
            scope,
            script_timeout_ms,
        } => {
            commands::script::cmd_script(&script_file, &scope, script_timeout_ms)?;
        }
    }

    Ok(())
}
