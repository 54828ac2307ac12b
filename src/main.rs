//! mail-gmail-mcp-rs: Gmail MCP server over stdio
//!
//! This server provides Gmail access via the Model Context Protocol (MCP)
//! over stdio: message listing and search, full reads with plain-text body
//! extraction, draft composition, and label and filter management. Sign-in
//! runs an OAuth2 browser flow once; tokens persist locally and refresh
//! automatically.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, CLI dispatch, and stdio serving
//! - [`config`]: Environment-driven configuration for paths, endpoints, and timeouts
//! - [`errors`]: Application error model
//! - [`auth`]: OAuth2 browser sign-in, token persistence, and refresh
//! - [`gmail`]: Gmail REST facade with error envelope mapping
//! - [`server`]: MCP tool handlers with validation and business orchestration
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`mime`]: MIME body extraction and draft encoding

mod auth;
mod config;
mod errors;
mod gmail;
mod mime;
mod models;
mod server;

use clap::{Parser, Subcommand};
use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Command line interface
#[derive(Debug, Parser)]
#[command(
    name = "mail-gmail-mcp-rs",
    version,
    about = "Gmail MCP server over stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP over stdio (the default when no subcommand is given)
    Serve,
    /// Run the browser sign-in flow and persist tokens
    Auth,
}

/// Application entry point
///
/// Initializes tracing from environment, loads config, and dispatches to
/// the selected command. Without a subcommand the process serves MCP over
/// stdio and expects to be spawned by an MCP client.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// GMAIL_MCP_KEY_FILE=~/Downloads/gcp-oauth.keys.json \
/// cargo run -- auth
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Auth => authorize(&config).await,
    }
}

/// Serve the MCP server over stdio until the client disconnects
async fn serve(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator = auth::Authenticator::new(config)?;
    let service = server::GmailServer::new(config, authenticator)?
        .serve(stdio())
        .await?;
    service.waiting().await?;
    Ok(())
}

/// Run the interactive browser sign-in and report token status
async fn authorize(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let authenticator = auth::Authenticator::new(config)?;
    let token = authenticator.login(config).await?;

    let expires_in = token
        .expires_in_seconds(std::time::SystemTime::now())
        .unwrap_or_default();
    println!("Signed in; tokens saved to {}", config.token_file.display());
    println!("Access token valid for {expires_in} seconds");
    if !token.has_refresh_token() {
        println!("No refresh token was granted; sign-in will be needed again after expiry");
    }
    Ok(())
}
