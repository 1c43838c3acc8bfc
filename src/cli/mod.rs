use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod demo;
pub mod fetch;
pub mod inspect;
pub mod serve;
pub mod version;

use config::{default_config_path, FragnetConfig};

#[derive(Parser)]
#[command(name = "fragnet")]
#[command(author = "Fragnet Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Content-addressed file fragmentation over a DHT", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/fragnet/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an in-process network: store on one node, download on another
    Demo {
        /// File to share (a random file is generated if omitted)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Number of storage nodes besides the bootstrap node
        #[arg(long, default_value_t = 2)]
        nodes: usize,

        /// Size in bytes of the generated file
        #[arg(long, default_value_t = 1_000_000)]
        size: usize,
    },

    /// Fragment a file offline and print its manifest
    Inspect {
        /// File to fragment
        path: PathBuf,

        /// Fragment size in bytes (default: from config)
        #[arg(long)]
        fragment_size: Option<usize>,

        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch fragments by hash from a serving peer and join them into a file
    Fetch {
        /// Peer address (host:port), as printed by `serve`
        #[arg(long)]
        peer: String,

        /// Where to write the joined fragments
        #[arg(long, short)]
        output: PathBuf,

        /// Fragment hashes, in file order
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Run a node serving the given files until Ctrl-C
    Serve {
        /// Files to store and serve
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::Version = cli.command {
        version::execute();
        return Ok(());
    }

    let config = match &cli.command {
        // A long-running node gets a config file to edit
        Commands::Serve { .. } if !config_path.exists() => {
            FragnetConfig::create_default(&config_path)?;
            println!("Created default config: {}", config_path.display());
            FragnetConfig::load(&config_path)?
        }
        _ => FragnetConfig::load_or_default(&config_path)?,
    };
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Demo { file, nodes, size } => demo::execute(&config, file, nodes, size).await,
        Commands::Inspect {
            path,
            fragment_size,
            json,
        } => inspect::execute(&config, path, fragment_size, json).await,
        Commands::Fetch {
            peer,
            output,
            hashes,
        } => fetch::execute(&config, peer, hashes, output).await,
        Commands::Serve { files } => serve::execute(&config, files).await,
        Commands::Version => Ok(()),
    }
}

/// Install the global subscriber. RUST_LOG wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Already installed (tests) is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
