//! CLI entry point for the Lectern retrieval pipeline (for dev and testing).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lectern_core::{
    app_data_dir, load_config, set_store_dir, status, Config, OllamaClient, RetrievalOptions,
    RetrievalService, StoreDir,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Lectern: retrieval over course materials")]
struct Cli {
    /// Use this store directory instead of the configured one.
    #[arg(long, global = true, value_name = "DIR")]
    store_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where Lectern stores its config and course indexes.
    DataDir,
    /// Print the effective config.
    Config,
    /// Persist the directory holding the course stores.
    SetStoreDir {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Index one file (PDF or plain text) into a course's store.
    Ingest {
        #[arg(long)]
        course: u64,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Index every supported file under a directory.
    IngestDir {
        #[arg(long)]
        course: u64,
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Retrieve the context for a question.
    Query {
        #[arg(long)]
        course: u64,
        #[arg(value_name = "QUESTION")]
        question: String,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show what a course's store holds.
    Stats {
        #[arg(long)]
        course: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config();
    if let Some(dir) = &cli.store_dir {
        config.store_dir = Some(dir.to_string_lossy().into_owned());
    }

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("Lectern backend");
            println!("  core: {}", status());
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
        Commands::SetStoreDir { path } => {
            let path = set_store_dir(&path)?;
            println!("Store directory set to {}", path.display());
        }
        Commands::Ingest { course, file } => {
            let service = build_service(&config)?;
            let cancel = cancel_on_ctrl_c();
            match service.ingest_with_cancel(&file, course, &cancel).await {
                Ok(n) => println!("Indexed {n} chunk(s) from {}", file.display()),
                Err(e) => return Err(format!("{}: {e}", file.display()).into()),
            }
        }
        Commands::IngestDir { course, dir } => {
            let service = build_service(&config)?;
            let cancel = cancel_on_ctrl_c();
            let report = service.ingest_dir(&dir, course, &cancel).await?;
            for (path, n) in &report.ingested {
                println!("  ok      {}  ({n} chunk(s))", path.display());
            }
            for (path, reason) in &report.failed {
                println!("  failed  {}  {reason}", path.display());
            }
            println!(
                "Indexed {} file(s), {} failed",
                report.ingested.len(),
                report.failed.len()
            );
        }
        Commands::Query {
            course,
            question,
            json,
        } => {
            let service = build_service(&config)?;
            let answer = service.query(&question, course).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.content);
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for source in &answer.sources {
                        println!("  {source}");
                    }
                }
            }
        }
        Commands::Stats { course } => {
            let service = build_service(&config)?;
            let stats = service.stats(course)?;
            println!("Course {course}");
            println!("  chunks:    {}", stats.chunks);
            match stats.dimension {
                Some(d) => println!("  dimension: {d}"),
                None => println!("  dimension: -"),
            }
            for source in &stats.sources {
                println!("  source:    {source}");
            }
        }
    }
    Ok(())
}

fn build_service(config: &Config) -> Result<RetrievalService, Box<dyn std::error::Error>> {
    let store_dir = config
        .store_dir()
        .ok_or("could not determine store directory; use --store-dir")?;
    let client = OllamaClient::from_config(config)?;
    let mut service = RetrievalService::new(StoreDir::new(store_dir), client.clone())
        .with_options(RetrievalOptions::from(config));
    if let Some(model) = config.summarize_model.as_deref().filter(|m| !m.is_empty()) {
        service = service.with_summarizer(client.summarizer(model));
    }
    Ok(service)
}

/// Cancels the returned token on Ctrl+C so ingestion stops before the next chunk.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current chunk...");
            on_signal.cancel();
        }
    });
    token
}
