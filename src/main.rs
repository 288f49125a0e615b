//! Authgate - multi-tenant OIDC authentication sample
//!
//! Serves the protected web, API and GraphQL endpoints, or runs the
//! desktop client against them.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use authgate::{
    cli::{Cli, ClientCommand, Command},
    client::{self, ClientOptions},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Client(client_cmd)) => run_client(client_cmd).await,
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Run the server
async fn run_server(cli: Cli) -> ExitCode {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run a desktop client command
async fn run_client(cmd: ClientCommand) -> ExitCode {
    let result = match cmd {
        ClientCommand::SignIn {
            authority,
            client_id,
            scopes,
            base_url,
            cache_path,
        } => {
            let scopes = if scopes.is_empty() {
                vec!["openid".to_string(), "profile".to_string()]
            } else {
                scopes
            };
            client::run_sign_in(&ClientOptions {
                authority,
                client_id,
                scopes,
                base_url,
                cache_path,
            })
            .await
        }
        ClientCommand::SignOut { cache_path } => {
            client::run_sign_out(&ClientOptions {
                authority: String::new(),
                client_id: String::new(),
                scopes: Vec::new(),
                base_url: String::new(),
                cache_path,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
