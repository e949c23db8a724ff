use clap::{Parser, Subcommand};
use relevo::config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relevo")]
#[command(about = "Read-replica routing and failover engine for primary/replica database clusters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Relevo Team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => {
            init_logging("info");
            generate_config(output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    Config::create_example_config(&output)
        .map_err(|e| format!("Failed to generate config: {e}"))?;

    println!("Example configuration written to: {}", output.display());
    println!("Edit the node DSNs, then validate with: relevo validate --config {}", output.display());
    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from_file(&config_path)
        .map_err(|e| format!("Configuration validation failed for {:?}: {}", config_path, e))?;

    init_logging(&config.logging.level);
    tracing::info!(
        "Configuration valid: primary '{}', {} replica(s), health interval {}s, max replica lag {}ms",
        config.cluster.primary.id,
        config.cluster.replicas.len(),
        config.health.interval_sec,
        config.routing.max_replica_lag_ms
    );

    println!("Configuration file {:?} is valid", config_path);
    Ok(())
}

fn show_version() {
    println!("relevo v{}", env!("CARGO_PKG_VERSION"));
    println!("Read-replica routing and failover engine");
}
