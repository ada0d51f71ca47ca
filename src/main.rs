use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{ask, chat, check_connections, create_index, ingest_file, serve, show_status};
use pdf_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Chat with your PDF documents using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.pdf-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, model and vector store settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Test connections to Ollama, the chat model and the vector store
    Check,
    /// Extract, caption, embed and store a PDF
    Ingest {
        /// Path to the PDF file
        path: PathBuf,
    },
    /// Ask a single question about the ingested documents
    Ask {
        /// The question to answer
        question: String,
    },
    /// Start an interactive chat session in the terminal
    Chat,
    /// Start the web UI
    Serve {
        /// Address to bind, e.g. "127.0.0.1:8501"
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show vector store and model status
    Status,
    /// Build the vector index over the stored embeddings
    Index,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| pdf_rag::RagError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Check => {
            check_connections(Config::load(&config_dir)?).await?;
        }
        Commands::Ingest { path } => {
            ingest_file(Config::load(&config_dir)?, &path).await?;
        }
        Commands::Ask { question } => {
            ask(Config::load(&config_dir)?, &question).await?;
        }
        Commands::Chat => {
            chat(Config::load(&config_dir)?).await?;
        }
        Commands::Serve { bind } => {
            serve(Config::load(&config_dir)?, bind).await?;
        }
        Commands::Status => {
            show_status(Config::load(&config_dir)?).await?;
        }
        Commands::Index => {
            create_index(Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
