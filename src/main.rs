//! GSuite MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server exposing Gmail, Google Calendar and
//! Google Contacts as tools.

use std::io::{BufRead, Write};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use gsuite_mcp_server_rust::config::{ensure_parent_dir, Config};
use gsuite_mcp_server_rust::google::api::str_field;
use gsuite_mcp_server_rust::google::Authenticator;
use gsuite_mcp_server_rust::mcp::server::McpServer;
use gsuite_mcp_server_rust::mcp::tools::ToolHandler;

/// GSuite MCP Server
#[derive(Parser)]
#[command(name = "gsuite-mcp")]
#[command(
    author,
    version,
    about = "GSuite MCP Server - Model Context Protocol server for Google Workspace",
    after_help = CONFIG_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server with stdio transport (default)
    Mcp,

    /// Interactive setup wizard (start here!)
    Setup,

    /// Test connection to Google APIs
    Test,

    /// Show authenticated user info
    Whoami,
}

const CONFIG_HELP: &str = "\
CONFIGURATION:
    Credentials path: $GSUITE_MCP_CREDENTIALS_PATH, $XDG_CONFIG_HOME/gsuite-mcp/credentials.json
                      or ~/.config/gsuite-mcp/credentials.json
    Token path:       $GSUITE_MCP_TOKEN_PATH, $XDG_DATA_HOME/gsuite-mcp/token.json
                      or ~/.local/share/gsuite-mcp/token.json
    OAuth port:       $GSUITE_MCP_OAUTH_PORT (default 8080)
    Testing mode:     ISH_MODE=true ISH_BASE_URL=http://localhost:9000 ISH_USER=testuser";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Mcp => run_server(&config).await,
        Commands::Setup => run_setup(&config).await,
        Commands::Test => run_test(&config).await,
        Commands::Whoami => run_whoami(&config).await,
    }
}

async fn run_server(config: &Config) -> anyhow::Result<()> {
    let handler = ToolHandler::from_config(config).context("Failed to create server")?;

    tracing::info!(
        "GSuite MCP Server starting{}",
        if config.is_ish_mode() { " (ish mode)" } else { "" }
    );

    let mut server = McpServer::new(handler);
    server.run_stdio().await?;
    Ok(())
}

async fn run_setup(config: &Config) -> anyhow::Result<()> {
    println!("=== GSuite MCP Server Setup ===\n");
    println!("Credentials file: {}", config.credentials_path.display());
    println!("Token file:       {}\n", config.token_path.display());

    let mut credentials_exist = config.credentials_exist();
    let mut token_exists = config.token_path.exists();

    println!(
        "{}",
        if credentials_exist {
            "[OK] Credentials file found"
        } else {
            "[!!] Credentials file NOT found"
        }
    );
    println!(
        "{}\n",
        if token_exists {
            "[OK] Token file found (already authenticated)"
        } else {
            "[..] Token file not found (will be created on first auth)"
        }
    );

    if !credentials_exist {
        println!("Create OAuth 2.0 credentials in Google Cloud Console:");
        println!("  1. Go to https://console.cloud.google.com/apis/credentials");
        println!("  2. Create an OAuth client ID of type 'Desktop app'");
        println!("  3. Download the JSON and save it as:");
        println!("     {}", config.credentials_path.display());
        println!("  4. Enable the Gmail, Calendar and People APIs\n");

        if confirm("Would you like to create the credentials directory now?")? {
            ensure_parent_dir(&config.credentials_path)?;
            println!("[OK] Directory created!\n");
        }
    } else if !token_exists && confirm("Credentials found! Authenticate with Google now?")? {
        let authenticator = Authenticator::new(config)?;
        authenticator
            .authenticate_interactive()
            .await
            .context("Authentication failed")?;
        println!("\n[OK] Authentication successful! Token saved.\n");
    }

    credentials_exist = config.credentials_exist();
    token_exists = config.token_path.exists();

    println!("=== Next Steps ===\n");
    if credentials_exist && token_exists {
        println!("[OK] All set! Start the server with:  gsuite-mcp mcp");
    } else if credentials_exist {
        println!("Run 'gsuite-mcp setup' again to authenticate with Google");
    } else {
        println!("Save credentials.json, then run 'gsuite-mcp setup' again");
    }

    Ok(())
}

async fn run_test(config: &Config) -> anyhow::Result<()> {
    println!("Testing Google API connection...\n");

    if !config.is_ish_mode() && !config.credentials_exist() {
        bail!(
            "Credentials file not found: {}. Run 'gsuite-mcp setup' first.",
            config.credentials_path.display()
        );
    }

    let handler = ToolHandler::from_config(config).context("Could not load credentials")?;
    let mut failures = 0;

    match handler.gmail().get_profile().await {
        Ok(profile) => println!(
            "✓ Gmail API connected (email: {})",
            str_field(&profile, "emailAddress")
        ),
        Err(e) => {
            failures += 1;
            println!("✗ Gmail API: {}", e);
        }
    }

    match handler.calendar().list_events(1, None, None).await {
        Ok(_) => println!("✓ Calendar API connected"),
        Err(e) => {
            failures += 1;
            println!("✗ Calendar API: {}", e);
        }
    }

    match handler.people().list_contacts(1).await {
        Ok(_) => println!("✓ People API connected"),
        Err(e) => {
            failures += 1;
            println!("✗ People API: {}", e);
        }
    }

    if failures > 0 {
        bail!("{} of 3 API checks failed", failures);
    }
    println!("\nAll tests passed! You're ready to use gsuite-mcp.");
    Ok(())
}

async fn run_whoami(config: &Config) -> anyhow::Result<()> {
    if !config.is_ish_mode() {
        if !config.credentials_exist() {
            bail!("Not configured. Run 'gsuite-mcp setup' first.");
        }
        if !config.token_path.exists() {
            bail!("Not authenticated. Run 'gsuite-mcp setup' to authenticate.");
        }
    }

    let handler = ToolHandler::from_config(config)?;
    let profile = handler
        .gmail()
        .get_profile()
        .await
        .context("Could not get profile")?;

    println!("Email:    {}", str_field(&profile, "emailAddress"));
    println!("Messages: {} total", profile["messagesTotal"]);
    println!("Threads:  {} total", profile["threadsTotal"]);
    Ok(())
}

/// Ask a yes/no question on the terminal; empty input means yes
fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [Y/n]: ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(matches!(answer.as_str(), "" | "y" | "yes"))
}
