use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::chat::SessionStore;
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::OllamaClient;
use crate::llm::{ChatMessage, ChatModel, GroqClient};
use crate::rag::{Answer, IngestReport, RagEngine};
use crate::web;

/// Ingest one PDF and print what was stored
#[inline]
pub async fn ingest_file(config: Config, path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let engine = RagEngine::new(config)
        .await
        .context("Failed to initialize RAG engine")?;

    let spinner = spinner(format!("Processing {}", path.display()));
    let result = engine.ingest_document(path).await;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            println!("{} Ingestion failed: {}", style("✗").red(), e);
            Err(anyhow::anyhow!("Ingestion of {} failed", path.display()))
        }
    };

    engine.shutdown().await;
    outcome
}

/// Answer a single question and list the chunks it drew on
#[inline]
pub async fn ask(config: Config, question: &str) -> Result<()> {
    let engine = RagEngine::new(config)
        .await
        .context("Failed to initialize RAG engine")?;

    let spinner = spinner("Thinking...".to_string());
    let result = engine.answer_with_sources(question).await;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(answer) => {
            print_answer(&answer);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e).context("Could not answer the question")),
    };

    engine.shutdown().await;
    outcome
}

/// Terminal chat session; ends on an empty line or `/exit`
#[inline]
pub async fn chat(config: Config) -> Result<()> {
    let engine = RagEngine::new(config)
        .await
        .context("Failed to initialize RAG engine")?;
    let sessions = SessionStore::new();
    let id = sessions.create().await;

    println!("{}", style("PDF RAG chat").bold());
    println!("Ask about your ingested documents. Empty line or /exit to quit.");
    println!();

    loop {
        let line: String = Input::new()
            .with_prompt(style("you").cyan().to_string())
            .allow_empty(true)
            .interact_text()
            .context("Failed to read input")?;

        let line = line.trim();
        if line.is_empty() || line == "/exit" {
            break;
        }

        let spinner = spinner("Thinking...".to_string());
        let result = sessions.submit(id, line, &engine).await;
        spinner.finish_and_clear();

        match result {
            Ok(turn) => println!("{} {}\n", style("assistant").green(), turn.content),
            Err(e) => println!("{} {}\n", style("error").red(), e),
        }
    }

    sessions.end(id).await?;
    engine.shutdown().await;
    Ok(())
}

/// Report reachability of Ollama, the chat model and the vector store
#[inline]
pub async fn check_connections(config: Config) -> Result<()> {
    println!("🔌 Connection Check");
    println!("{}", "=".repeat(50));

    let mut healthy = true;

    print!("   Ollama ({}:{}, {}): ", config.ollama.host, config.ollama.port, config.ollama.model);
    match OllamaClient::new(&config.ollama).and_then(|client| client.health_check()) {
        Ok(()) => println!("{}", style("ok").green()),
        Err(e) => {
            healthy = false;
            println!("{} - {:#}", style("failed").red(), e);
        }
    }

    print!("   Chat model ({}): ", config.llm.chat_model);
    match config.api_keys.groq.as_deref() {
        None => println!("{} - GROQ_API_KEY not set", style("skipped").yellow()),
        Some(key) => {
            let result = GroqClient::new(&config.llm, &config.llm.chat_model, Some(key))
                .and_then(|client| client.complete(&[ChatMessage::user("Reply with OK.")], Some(0.0)));
            match result {
                Ok(_) => println!("{}", style("ok").green()),
                Err(e) => {
                    healthy = false;
                    println!("{} - {:#}", style("failed").red(), e);
                }
            }
        }
    }

    print!("   Vector store ({}): ", config.store_uri());
    match VectorStore::new(&config).await {
        Ok(store) => match store.validate_integrity().await {
            Ok(true) => println!("{}", style("ok").green()),
            Ok(false) => {
                healthy = false;
                println!("{} - integrity check failed", style("failed").red());
            }
            Err(e) => {
                healthy = false;
                println!("{} - {}", style("failed").red(), e);
            }
        },
        Err(e) => {
            healthy = false;
            println!("{} - {}", style("failed").red(), e);
        }
    }

    if !healthy {
        warn!("One or more services are unreachable");
        anyhow::bail!("Connection check failed");
    }
    Ok(())
}

/// Show collection details and record count
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    println!("📊 PDF RAG Status");
    println!("{}", "=".repeat(50));
    println!();

    println!("🔍 Vector Store:");
    println!("   URI: {}", config.store_uri());
    match VectorStore::new(&config).await {
        Ok(store) => {
            println!("   Collection: {}", store.collection_name());
            println!("   Index name: {}", store.index_name());
            println!("   Dimensions: {}", store.vector_dimension());
            println!("   Distance: {}", store.distance());
            match store.count_records().await {
                Ok(count) => println!("   Records: {}", count),
                Err(e) => println!("   Records: unavailable - {}", e),
            }
        }
        Err(e) => println!("   ❌ Failed to open: {}", e),
    }

    println!();
    println!("🤖 Models:");
    println!("   Embedding: {} (Ollama)", config.ollama.model);
    println!("   Chat: {}", config.llm.chat_model);
    println!("   Vision: {}", config.llm.vision_model);

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'pdf-rag ingest <file.pdf>' to add a document");
    println!("   • Use 'pdf-rag chat' or 'pdf-rag serve' to ask questions");

    Ok(())
}

/// Build the named vector index over the collection
#[inline]
pub async fn create_index(config: Config) -> Result<()> {
    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;

    let records = store.count_records().await?;
    if records == 0 {
        println!("Collection '{}' is empty; ingest a document first.", store.collection_name());
        return Ok(());
    }

    let spinner = spinner(format!("Building index '{}'", store.index_name()));
    let result = store.create_vector_index().await;
    spinner.finish_and_clear();
    result.context("Failed to create vector index")?;

    println!(
        "{} Index '{}' built over {} records",
        style("✓").green(),
        store.index_name(),
        records
    );
    Ok(())
}

/// Start the web UI and block until Ctrl-C
#[inline]
pub async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let addr: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind))?,
        None => config.server.socket_addr()?,
    };

    let engine = Arc::new(
        RagEngine::new(config)
            .await
            .context("Failed to initialize RAG engine")?,
    );

    println!("Serving on http://{}", addr);
    web::serve(Arc::clone(&engine), addr).await?;

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown().await,
        Err(_) => info!("Engine still referenced at exit"),
    }
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_report(report: &IngestReport) {
    println!("{} Ingested {}", style("✓").green(), report.source_path);
    println!("   Pages: {}", report.pages);
    println!("   Text chunks: {}", report.text_chunks);
    println!(
        "   Image captions: {} of {} images",
        report.image_chunks, report.images_found
    );
    println!("   Records written: {}", report.records_written);
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);

    if !answer.sources.is_empty() {
        println!();
        println!("{}", style("Sources:").dim());
        for source in &answer.sources {
            println!(
                "{}",
                style(format!(
                    "  {} p.{} ({}, score {:.3})",
                    source.source_path, source.page_number, source.content_type, source.score
                ))
                .dim()
            );
        }
    }
}
