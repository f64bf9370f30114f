//! Threadwise CLI - forum thread summaries
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use threadwise::{
    forum, logging, parse_cache_key, Config, ErrorClassifier, GeminiGenerator, Post,
    SummaryPipeline, SummaryResponse, Thread, UserFriendlyError,
};

#[derive(Parser)]
#[command(name = "threadwise")]
#[command(author, version, about = "Cached AI summaries of forum threads", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a thread exported as JSON ({"thread": ..., "posts": [...]})
    Summarise {
        /// Path to the thread export
        file: PathBuf,
        /// Last activity timestamp (epoch millis); derived from the posts if omitted
        #[arg(long)]
        timestamp: Option<String>,
        /// Print the raw response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the cache key for a thread and timestamp
    Key {
        thread_id: String,
        timestamp: String,
    },
    /// Classify an error message the way the pipeline would
    Classify {
        message: String,
        /// Extra context matched alongside the message
        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Deserialize)]
struct ThreadExport {
    thread: Thread,
    #[serde(default)]
    posts: Vec<Post>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match cli.command {
        Commands::Summarise {
            file,
            timestamp,
            json,
        } => {
            let content = std::fs::read_to_string(&file)?;
            let export: ThreadExport = serde_json::from_str(&content)?;
            let timestamp = timestamp
                .unwrap_or_else(|| forum::last_post_timestamp(&export.thread, &export.posts));

            let config = Config::load()?;
            let backend = GeminiGenerator::from_config(&config)?;
            let pipeline = SummaryPipeline::from_config(&config, Arc::new(backend));
            pipeline.start();

            eprintln!(
                "Summarising \"{}\" ({} posts)...",
                export.thread.title,
                export.posts.len()
            );
            let response = pipeline
                .request_summary(&export.thread.id, &timestamp, &export.thread, &export.posts)
                .await;
            pipeline.shutdown().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&export.thread, &response);
            }
        }
        Commands::Key {
            thread_id,
            timestamp,
        } => {
            let key = threadwise::generate_cache_key(&thread_id, &timestamp)?;
            println!("{}", key);
            if let Some(parsed) = parse_cache_key(key.as_str()) {
                println!("  thread:    {}", parsed.thread_id);
                println!("  timestamp: {}", parsed.last_post_timestamp);
            }
        }
        Commands::Classify { message, context } => {
            let error = ErrorClassifier::new().classify(&message, context.as_deref());
            print_error(&error);
            println!("  category:  {}", error.category);
            println!("  retryable: {}", error.retryable);
        }
    }

    Ok(())
}

fn print_response(thread: &Thread, response: &SummaryResponse) {
    println!("=== {} ===\n", thread.title.bold());

    if let Some(error) = &response.error {
        print_error(error);
        println!();
    }

    let Some(data) = &response.data else {
        return;
    };

    let label = format!("{} ({}/10)", data.health_label(), data.health_score());
    let label = match data.health_score() {
        7..=10 => label.green(),
        4..=6 => label.yellow(),
        1..=3 => label.red(),
        _ => label.normal(),
    };
    println!("🩺 Health: {}", label);
    println!("🎭 Sentiment: {}\n", data.sentiment);

    println!("📝 Summary:");
    for line in &data.summary {
        println!("  • {}", line);
    }

    if !data.key_points.is_empty() {
        println!("\n📌 Key Points:");
        for point in &data.key_points {
            println!("  • {}", point);
        }
    }

    if !data.contributors.is_empty() {
        println!("\n👥 Contributors:");
        for contributor in &data.contributors {
            println!("  • {}: {}", contributor.username.bold(), contributor.contribution);
        }
    }

    let source = if response.cached {
        "cached"
    } else if response.fallback {
        "fallback"
    } else {
        "generated"
    };
    println!(
        "\n{}",
        format!(
            "{} at {} [{}]",
            source,
            response.generated_at.format("%Y-%m-%d %H:%M"),
            response.request_id
        )
        .dimmed()
    );
}

fn print_error(error: &UserFriendlyError) {
    println!("⚠️  {}", error.title.yellow().bold());
    println!("  {}", error.message);
    if let Some(secs) = error.retry_after {
        println!("  Retry after {}s", secs);
    }
    for suggestion in &error.suggestions {
        println!("  - {}", suggestion);
    }
}
