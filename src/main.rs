use std::process::ExitCode;

use clap::Parser;
use console::style;

use ppctl::auth;
use ppctl::cli::{Cli, Commands};
use ppctl::commands;
use ppctl::config::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    ppctl::logging::init();
    tracing::debug!("ppctl v{} starting", ppctl::VERSION);

    let cli = Cli::parse();
    let config = AppConfig::load();

    let result = match cli.command {
        Commands::Login {
            profile,
            tenant,
            device_code,
            hint,
        } => {
            commands::login(
                &config,
                profile.as_deref(),
                tenant.as_deref(),
                device_code,
                hint.as_deref(),
            )
            .await
        }
        Commands::Logout { profile } => commands::logout(&config, profile.as_deref()),
        Commands::Status { profile } => commands::status(&config, profile.as_deref()),
        Commands::Token { resource, profile } => {
            commands::token(&config, resource.as_deref(), profile.as_deref()).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            exit_code_for(&err)
        }
    }
}

/// 0 success, 1 generic failure (auth/login included), 2 configuration
/// errors the user has to fix before retrying.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<auth::Error>() {
        Some(auth::Error::Config(_)) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
