//! `ragpipe config` — Configuration management commands.

use anyhow::{Context, bail};
use ragpipe_config::AppConfig;
use std::path::{Path, PathBuf};

fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    for warning in warnings(&config) {
        println!("   Warning: {warning}");
    }

    println!();
    println!("   Model:       {}", config.provider.model);
    println!("   Embeddings:  {}", config.provider.embedding_model);
    println!("   Index:       {} ({})", config.index.backend, config.index.collection);
    println!("   Rate limit:  {}/min per caller", config.rate_limit.max_requests_per_minute);
    println!("   Context:     {} tokens", config.context.max_tokens);
    Ok(())
}

/// Non-fatal problems worth surfacing.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set RAGPIPE_API_KEY or OPENAI_API_KEY)");
    }
    if config.index.backend == "qdrant" && config.index.url.is_none() {
        warnings.push("Qdrant backend selected but index.url is not set");
    }
    if config.index.backend == "memory" {
        warnings.push("In-memory index starts empty: answers will have no retrieved context");
    }
    if config.context.high_relevance_threshold < config.context.similarity_threshold {
        warnings.push("context.high_relevance_threshold is below similarity_threshold");
    }
    warnings
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("********".into());
    }
    if config.index.api_key.is_some() {
        config.index.api_key = Some("********".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn init(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    write_default(&path, force)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}
