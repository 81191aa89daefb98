use anyhow::Result;
use clap::{Parser, Subcommand};
use content_retrieval::commands::{
    purge_cache, reindex, reset, search, show_config, show_status, write_config,
};
use content_retrieval::config::Config;

#[derive(Parser)]
#[command(name = "content-retrieval")]
#[command(about = "Embed a content database into a vector index and search it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to config.toml
    Config {
        /// Show current configuration instead of saving it
        #[arg(long)]
        show: bool,
    },
    /// Embed every content record into the vector collection
    Reindex {
        /// Record failing records and continue instead of aborting
        #[arg(long)]
        keep_going: bool,
    },
    /// Search indexed content by semantic similarity
    Search {
        /// Free-text query
        query: String,
        /// Maximum number of results (defaults to search.default_limit)
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show vector store and cache status
    Status,
    /// Drop the vector collection
    Reset,
    /// Delete expired embedding cache entries
    PurgeCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_default()?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
        }
        Commands::Reindex { keep_going } => {
            reindex(&config, keep_going).await?;
        }
        Commands::Search { query, limit, json } => {
            search(&config, &query, limit, json).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Reset => {
            reset(&config).await?;
        }
        Commands::PurgeCache => {
            purge_cache(&config).await?;
        }
    }

    Ok(())
}
