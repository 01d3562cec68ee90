// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `skynet` - Skynet RPC fabric launcher.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod env;

#[derive(Parser)]
#[command(name = "skynet", about = "Skynet RPC fabric", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a pre-configured RPC server and block until shutdown
    Server,
    /// Invoke a method on a remote service
    Call {
        /// Service name, e.g. EchoService
        service: String,
        /// Method name, e.g. echo
        method: String,
        /// Parameters as a JSON object (default: {})
        params: Option<String>,
        /// Service version to resolve ("*" = highest)
        #[arg(long, default_value = "*")]
        service_version: String,
        /// Region override (default: configured region)
        #[arg(long)]
        region: Option<String>,
        /// Declare the call safe to retry after a failed read
        #[arg(long)]
        idempotent: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = config::load()?;
    config.log_unknown_options();

    match cli.command {
        Command::Server => commands::server::run(config).await,
        Command::Call { service, method, params, service_version, region, idempotent } => {
            commands::call::run(commands::call::CallArgs {
                config,
                service,
                method,
                params,
                version: service_version,
                region,
                idempotent,
            })
            .await
        }
    }
}
