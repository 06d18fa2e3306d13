use clap::Parser;
use goenv::cli::Cli;
use goenv::config::DEBUG_VAR;
use goenv::{commands, ui};

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; logs always go to stderr so exec'd tools keep a clean stdout
    let debug = cli.verbose
        || std::env::var(DEBUG_VAR).is_ok_and(|value| !value.is_empty() && value != "0");
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if debug { "goenv=debug" } else { "goenv=warn" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let code = match commands::execute(cli) {
        Ok(code) => code,
        Err(err) => {
            ui::error(format!("{:#}", err));
            1
        }
    };
    std::process::exit(code);
}
