// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier: relays messages from personal Telegram accounts into bot chats.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use courier_config::{ConfigError, CourierConfig};
use courier_vault::SessionVault;

/// Courier - Telegram bot and account relay.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the webhook server, relay, and background loops.
    Serve,
    /// Load and validate configuration, then exit.
    CheckConfig,
    /// Print a fresh base64 key for `vault.session_key`.
    GenKey,
}

fn load_config(path: Option<&std::path::Path>) -> Result<CourierConfig, Vec<ConfigError>> {
    match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.command == Commands::GenKey {
        return match SessionVault::generate_key() {
            Ok(key) => {
                println!("{key}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::CheckConfig => {
            println!(
                "courier: configuration ok (server {}:{}, database {})",
                config.server.host, config.server.port, config.storage.database_path
            );
            ExitCode::SUCCESS
        }
        Commands::Serve => match serve::run_serve(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Commands::GenKey => ExitCode::SUCCESS,
    }
}
