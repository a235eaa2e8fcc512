use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use news_rag::commands::{
    delete, embed, invoke, print_records, prompt, report_error, scrape, search, serve, show_status,
    upsert,
};
use news_rag::config::{Config, get_config_dir, init_config, show_config};

#[derive(Parser)]
#[command(name = "news-rag")]
#[command(about = "Scrape news articles into a vector index and answer questions over them")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape news sections, embed the articles and write JSONL files
    Scrape {
        /// Section to scrape; repeat for several. Defaults to the configured sections
        #[arg(long = "section")]
        sections: Vec<String>,
    },
    /// Upsert every JSONL file into the vector store
    Upsert,
    /// Delete every vector in the configured namespace
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the first records of each JSONL file
    Print {
        /// Records to show per file
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
    /// Print the embedding of a query
    Embed {
        query: String,
    },
    /// Print the closest stored passages for a query
    Search {
        query: String,
    },
    /// Print the context and prompt that would be sent to the model
    Prompt {
        query: String,
    },
    /// Answer a question, streaming the model output
    Invoke {
        query: String,
    },
    /// Serve the question endpoint over HTTP
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8000
        #[arg(long)]
        bind: Option<String>,
        /// Directory of static files served at /
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Check provider connectivity and vector counts
    Status,
    /// Show the effective configuration
    Config {
        /// Write a default config.toml
        #[arg(long)]
        init: bool,
        /// Overwrite an existing config.toml with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { init: true, force } = cli.command {
        let path = init_config(&config_dir, force)?;
        println!("✓ Wrote {}", path.display());
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Scrape { sections } => {
            scrape(&config, &sections).await?;
        }
        Commands::Upsert => {
            upsert(&config).await?;
        }
        Commands::Delete { yes } => {
            delete(&config, yes).await?;
        }
        Commands::Print { limit } => {
            print_records(&config, limit)?;
        }
        Commands::Embed { query } => {
            embed(&config, &query).await?;
        }
        Commands::Search { query } => {
            search(&config, &query).await?;
        }
        Commands::Prompt { query } => {
            prompt(&config, &query).await?;
        }
        Commands::Invoke { query } => {
            invoke(&config, &query).await?;
        }
        Commands::Serve { bind, static_dir } => {
            serve(&config, bind, static_dir).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Config { .. } => {
            show_config(&config);
        }
    }

    Ok(())
}
