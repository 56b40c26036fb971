//! Stratus CLI - keep a local notes dataset in sync with one remote backup.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod secrets;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::passphrase::run_passphrase;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_sync_conflicts, run_sync_watch};
use crate::config_profiles::{resolve_sync_settings, CliProfilesConfig};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        if let Some(hint) = error.hint() {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "stratus=info".parse::<tracing_subscriber::filter::Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let db_path = cli.db_path;
    match command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Config { command } => run_config(command, profile),
        Commands::Passphrase { command } => run_passphrase(command, profile),
        Commands::Add { title, content } => {
            run_add(title, &content, &resolve_db_path(db_path)?).await
        }
        Commands::List { limit, json } => run_list(limit, json, &resolve_db_path(db_path)?).await,
        Commands::Delete { id } => run_delete(&id, &resolve_db_path(db_path)?).await,
        Commands::Export { output } => {
            run_export(output.as_deref(), &resolve_db_path(db_path)?).await
        }
        Commands::Import { path, replace } => {
            let settings = resolve_sync_settings(profile)?;
            run_import(&path, replace, &settings, &resolve_db_path(db_path)?).await
        }
        Commands::Status { json } => {
            let profile_name = CliProfilesConfig::load()?.resolve_profile_name(profile);
            let settings = resolve_sync_settings(profile)?;
            run_status(&profile_name, json, &settings, &resolve_db_path(db_path)?).await
        }
        Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit, json }),
            ..
        } => run_sync_conflicts(limit, json, &resolve_db_path(db_path)?).await,
        Commands::Sync {
            command: Some(SyncCommands::Watch { interval }),
            ..
        } => {
            let settings = resolve_sync_settings(profile)?;
            run_sync_watch(interval, &settings, &resolve_db_path(db_path)?).await
        }
        Commands::Sync {
            command: None,
            strategy,
            json,
        } => {
            let settings = resolve_sync_settings(profile)?;
            run_sync(strategy.map(Into::into), json, &settings, &resolve_db_path(db_path)?).await
        }
    }
}
