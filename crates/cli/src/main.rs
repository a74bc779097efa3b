//! ragpipe CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive or single-message chat through the pipeline
//! - `config`  — Show, validate, or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragpipe",
    about = "ragpipe — rate-limited, cached, retrieval-augmented chat",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat through the pipeline
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Caller identity used for rate limiting
        #[arg(long, default_value = "127.0.0.1")]
        caller: String,

        /// Conversation session id (random when omitted)
        #[arg(long)]
        session: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Load and validate the configuration
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Chat {
            message,
            caller,
            session,
        } => commands::chat::run(message, caller, session).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_flags_parse() {
        let cli = Cli::try_parse_from([
            "ragpipe", "chat", "-m", "What is your return policy?", "--caller", "10.0.0.9", "--session", "s1",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                message,
                caller,
                session,
            } => {
                assert_eq!(message.as_deref(), Some("What is your return policy?"));
                assert_eq!(caller, "10.0.0.9");
                assert_eq!(session.as_deref(), Some("s1"));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn config_init_force_parses() {
        let cli = Cli::try_parse_from(["ragpipe", "--json", "config", "init", "--force"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
