//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-tenant OIDC authentication sample
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "AUTHGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "AUTHGATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "AUTHGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AUTHGATE_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTHGATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// Desktop client commands
    #[command(subcommand)]
    Client(ClientCommand),
}

/// Desktop client subcommands
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Sign in and call the protected endpoints
    SignIn {
        /// Identity-provider authority URL
        #[arg(long, env = "AUTHGATE_AUTHORITY")]
        authority: String,

        /// Application (client) identifier
        #[arg(long, env = "AUTHGATE_CLIENT_ID")]
        client_id: String,

        /// Scope to request (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Base URL of the protected service
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        base_url: String,

        /// Token cache file override
        #[arg(long)]
        cache_path: Option<PathBuf>,
    },

    /// Clear the cached tokens
    SignOut {
        /// Token cache file override
        #[arg(long)]
        cache_path: Option<PathBuf>,
    },
}
