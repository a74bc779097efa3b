//! `ragpipe chat` — Interactive or single-message chat mode.

use anyhow::{Context, bail};
use ragpipe_config::AppConfig;
use ragpipe_core::Error;
use ragpipe_pipeline::{ChatPipeline, ChatResponse, InboundMessage, UNKNOWN_CATEGORY};
use ragpipe_providers::OpenAiCompatProvider;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>, caller: String, session: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    RAGPIPE_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.provider)?);
    let index = ragpipe_index::from_config(&config.index)?;
    let pipeline = ChatPipeline::from_config(&config, provider, index);
    let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Some(text) = message {
        let response = pipeline.handle(&InboundMessage::new(caller, session, text)).await?;
        println!("{}", response.response);
        print_footer(&response);
        return Ok(());
    }

    println!();
    println!("  ragpipe — interactive chat");
    println!();
    println!("  Model:     {}", config.provider.model);
    println!("  Index:     {} ({})", config.index.backend, config.index.collection);
    println!("  Session:   {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  /clear resets the conversation, /stats prints counters,");
    println!("  /analysis summarizes this session's topics.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" | "/exit" | "/quit" | ":q" => break,
            "/clear" => {
                pipeline.clear_history(&session);
                println!("  History cleared.");
            }
            "/stats" => println!("{}", serde_json::to_string_pretty(&pipeline.stats())?),
            "/analysis" => match pipeline.session_analysis(&session) {
                Some(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
                None => println!("  No answered messages in this session yet."),
            },
            text => {
                let msg = InboundMessage::new(caller.as_str(), session.as_str(), text);
                match pipeline.handle(&msg).await {
                    Ok(response) => {
                        println!();
                        for line in response.response.lines() {
                            println!("  Assistant > {line}");
                        }
                        print_footer(&response);
                        println!();
                    }
                    Err(Error::RateLimitExceeded { .. }) => {
                        eprintln!("  [Rate limited] Too many requests, wait a moment and try again.");
                    }
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
        }
        prompt()?;
    }

    let stats = pipeline.stats();
    let analysis = pipeline.global_analysis();
    tracing::info!(
        requests = stats.requests,
        cache_hit_rate = stats.cache_hit_rate(),
        context_failures = stats.context_failures,
        interactions = analysis.total_interactions,
        average_confidence = analysis.average_confidence,
        "Session finished"
    );
    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_footer(response: &ChatResponse) {
    let mut notes = vec![format!("confidence {:.2}", response.confidence)];
    if response.category != UNKNOWN_CATEGORY {
        notes.push(response.category.replace('_', " "));
    }
    if response.context_used {
        notes.push("context".into());
    }
    if response.cached {
        notes.push("cached".into());
    }
    eprintln!("  ({})", notes.join(", "));
    if response.needs_human {
        eprintln!("  Low confidence: consider confirming this answer with a person.");
    }
}
