//! # Docent CLI
//!
//! The `docent` binary answers questions about a document collection
//! from the command line and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent classify "<question>"` | Show the intent classification for a question |
//! | `docent ask "<question>"` | Answer a question against a local collection |
//! | `docent serve http` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Inspect how a question would be routed
//! docent classify "where is passport.pdf"
//!
//! # Answer against a JSON-described collection
//! docent ask "what is the Q1 revenue?" --collection demos/collection.json
//!
//! # Stream the answer fragments as they are produced
//! docent ask "summarize the contract" --collection demos/collection.json --stream
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use docent::adapters::{InMemoryDocumentStore, InMemoryIndex};
use docent::collection::{load_collection, read_collection};
use docent::config::load_config;
use docent::generate::{create_embedder, create_generator};
use docent::models::{AnswerLength, Query, QueryScope};
use docent::pipeline::Pipeline;
use docent::server::run_server;
use docent::stream::StreamSession;

/// Docent — confidence-gated question answering over a private document
/// collection.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Answer natural-language questions about a document collection",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Show the intent classification for a question.
    ///
    /// Prints the routing domain, response style, confidence, extracted
    /// entities, and the classifier's reasoning. No backends are called.
    Classify {
        /// The question to classify.
        query: String,
    },

    /// Answer a question against a local collection.
    ///
    /// Requires `[embedding]` and `[generation]` providers in the config
    /// for content questions; classification-only domains (greetings,
    /// navigation, listings) work without them.
    Ask {
        /// The question to answer.
        query: String,

        /// Path to a JSON collection file to load and index.
        #[arg(long)]
        collection: Option<PathBuf>,

        /// Restrict retrieval to one document ID.
        #[arg(long)]
        document: Option<String>,

        /// Requested answer length: short, medium, summary, or long.
        #[arg(long, default_value = "medium")]
        length: String,

        /// Stream answer fragments as they are produced.
        #[arg(long)]
        stream: bool,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the HTTP API server on the configured bind address.
    Http {
        /// Path to a JSON collection file to load and index at startup.
        #[arg(long)]
        collection: Option<PathBuf>,
    },
}

fn parse_length(raw: &str) -> Result<AnswerLength> {
    match raw {
        "short" => Ok(AnswerLength::Short),
        "medium" => Ok(AnswerLength::Medium),
        "summary" => Ok(AnswerLength::Summary),
        "long" => Ok(AnswerLength::Long),
        other => anyhow::bail!(
            "Unknown answer length: {}. Use short, medium, summary, or long.",
            other
        ),
    }
}

async fn build_pipeline(
    config: docent::config::Config,
    collection_path: Option<&PathBuf>,
) -> Result<Arc<Pipeline>> {
    let embedder: Arc<dyn docent::adapters::Embedder> = create_embedder(&config.embedding)?.into();
    let generator: Arc<dyn docent::adapters::TextGenerator> =
        create_generator(&config.generation)?.into();

    let (index, store) = match collection_path {
        Some(path) => {
            let collection = read_collection(path)?;
            load_collection(&collection, &embedder).await?
        }
        None => (
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryDocumentStore::new()),
        ),
    };

    let pipeline = Pipeline::builder()
        .config(config)
        .embedder(embedder)
        .index(index)
        .generator(generator)
        .store(store)
        .build()?;

    Ok(Arc::new(pipeline))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // `classify` needs no config or backends.
    if let Commands::Classify { query } = &cli.command {
        let classification = docent::classifier::classify(query, &[]);
        println!("domain:     {:?}", classification.domain);
        println!("style:      {:?}", classification.style);
        println!("confidence: {:.2}", classification.confidence);
        println!("reasoning:  {}", classification.reasoning);
        if !classification.entities.is_empty() {
            println!("entities:   {}", serde_json::to_string(&classification.entities)?);
        }
        return Ok(());
    }

    // A missing config file falls back to defaults; a malformed one is
    // a hard error.
    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        docent::config::Config::default()
    };

    match cli.command {
        Commands::Classify { .. } => unreachable!(),
        Commands::Ask {
            query,
            collection,
            document,
            length,
            stream,
        } => {
            let pipeline = build_pipeline(config, collection.as_ref()).await?;

            let mut q = Query::new(query, "cli");
            if let Some(id) = document {
                q.scope = QueryScope::Document(id);
            }
            q.answer_length = parse_length(&length)?;

            if stream {
                let (session, mut rx) = StreamSession::new();
                let task_pipeline = pipeline.clone();
                let task = tokio::spawn(async move {
                    task_pipeline.answer_stream(&q, &[], session).await;
                });

                while let Some(event) = rx.recv().await {
                    match event {
                        docent::models::StreamEvent::Content { text, .. } => {
                            print!("{}", text);
                            std::io::stdout().flush()?;
                        }
                        docent::models::StreamEvent::Done { sources, .. } => {
                            println!();
                            for chunk in &sources.chunks {
                                println!(
                                    "  source: {} [{:.2}]",
                                    chunk.document_name, chunk.similarity
                                );
                            }
                            break;
                        }
                        docent::models::StreamEvent::Error { message, .. } => {
                            println!();
                            anyhow::bail!("{}", message);
                        }
                        _ => {}
                    }
                }
                task.await?;
            } else {
                let result = pipeline.answer(&q, &[]).await?;
                println!("{}", result.answer);
                if !result.sources.is_empty() {
                    println!();
                    for chunk in &result.sources.chunks {
                        println!("  source: {} [{:.2}]", chunk.document_name, chunk.similarity);
                    }
                    println!("  confidence: {:.2}", result.confidence);
                }
            }
        }
        Commands::Serve { service } => match service {
            ServeService::Http { collection } => {
                let pipeline = build_pipeline(config, collection.as_ref()).await?;
                run_server(pipeline).await?;
            }
        },
    }

    Ok(())
}
