//! apirun CLI - Main Entry Point

use std::time::Duration;

use apirun_cli::client::ApiClient;
use apirun_cli::commands::{collection, execute};
use apirun_cli::output::{self, print_error, print_value};
use clap::{Parser, Subcommand};

/// apirun CLI - generate and run API tests from OpenAPI documents
#[derive(Parser)]
#[command(name = "apirun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Server address
    #[arg(long, default_value = "http://127.0.0.1:5000", env = "APIRUN_SERVER", global = true)]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 600, global = true)]
    timeout: u64,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test collection from an OpenAPI document
    Generate(collection::GenerateArgs),

    /// Show the stored collection of a run
    Show(collection::RunIdArgs),

    /// Count the tests in a run
    Count(collection::RunIdArgs),

    /// Replace the stored collection of a run
    Update(collection::UpdateArgs),

    /// Remove items from a run by ID
    Prune(collection::PruneArgs),

    /// Run the whole collection in one pass
    Execute(collection::RunIdArgs),

    /// Run the collection batch by batch with progress
    Run(execute::RunArgs),

    /// Show the stored summary of the last full execution
    Summary(collection::RunIdArgs),

    /// Check server status
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let client = ApiClient::new(&cli.server, Duration::from_secs(cli.timeout))?;
    let format = cli.format;

    match cli.command {
        Commands::Generate(args) => collection::generate(args, &client, format).await?,
        Commands::Show(args) => collection::show(args, &client, format).await?,
        Commands::Count(args) => collection::count(args, &client, format).await?,
        Commands::Update(args) => collection::update(args, &client).await?,
        Commands::Prune(args) => collection::prune(args, &client, format).await?,
        Commands::Execute(args) => execute::execute(args, &client, format).await?,
        Commands::Run(args) => execute::run(args, &client, format).await?,
        Commands::Summary(args) => execute::summary(args, &client, format).await?,
        Commands::Health => match client.health().await {
            Ok(status) => {
                if format == output::OutputFormat::Table {
                    println!("✅ Server is running at {}", client.base_url());
                    match status.get("worker") {
                        Some(serde_json::Value::String(worker)) => println!("   Worker: {}", worker),
                        _ => println!("   Worker: not checked"),
                    }
                } else {
                    print_value(&status, format);
                }
            }
            Err(e) => {
                print_error(&format!("Cannot reach server at {}: {}", client.base_url(), e));
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
