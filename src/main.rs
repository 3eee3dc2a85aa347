//! NetMetr client - command line entry point

use clap::Parser;
use netmetr::{app::App, cli::Cli, config::EnvManager, error::AppError};
use std::{error::Error, process};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();

    if cli.env_help {
        println!("{}", EnvManager::display_env_help());
        for warning in EnvManager::validate_current_env() {
            eprintln!("Warning: {}", warning);
        }
        return;
    }

    let use_color = cli.use_colors();
    let debug = cli.debug;

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));

        if let Some(source) = e.source() {
            eprintln!("Caused by: {}", source);
        }

        if debug {
            eprintln!();
            eprintln!("{}", e.user_friendly_message());
        }

        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<(), AppError> {
    App::new(cli)?.run().await
}
