mod auth_commands;
mod model_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    credlink_agents::OAuthProviders,
    credlink_config::CredlinkConfig,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "credlink",
    version,
    about = "Use Qwen Code and Gemini CLI OAuth credentials for LLM calls"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of credlink.toml / .yaml / .json).
    #[arg(long, global = true, env = "CREDLINK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or refresh OAuth credentials.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    /// List models offered by the OAuth providers.
    Models {
        /// Provider id (qwen-code or gemini-cli). All providers when omitted.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Send a single prompt and print the reply.
    Chat {
        /// Provider id (qwen-code or gemini-cli).
        #[arg(long)]
        provider: String,
        /// Model id. Defaults to the configured or built-in default.
        #[arg(long)]
        model: Option<String>,
        /// Wait for the full reply instead of streaming it.
        #[arg(long, default_value_t = false)]
        no_stream: bool,
        prompt: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CredlinkConfig> {
    match &cli.config {
        Some(path) => Ok(credlink_config::load_config(path)?),
        None => Ok(credlink_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "credlink starting");

    let config = load_config(&cli)?;
    let providers = OAuthProviders::from_config(&config);

    match cli.command {
        Commands::Auth { action } => auth_commands::handle_auth(&providers, action).await,
        Commands::Models { provider } => {
            model_commands::list_models(&providers, provider.as_deref()).await
        },
        Commands::Chat {
            provider,
            model,
            no_stream,
            prompt,
        } => {
            model_commands::chat(&providers, &provider, model.as_deref(), &prompt, !no_stream).await
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_parses_flags() {
        let cli = Cli::try_parse_from([
            "credlink",
            "--log-level",
            "debug",
            "chat",
            "--provider",
            "qwen-code",
            "--no-stream",
            "hello there",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Chat {
                provider,
                model,
                no_stream,
                prompt,
            } => {
                assert_eq!(provider, "qwen-code");
                assert!(model.is_none());
                assert!(no_stream);
                assert_eq!(prompt, "hello there");
            },
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credlink.toml");
        std::fs::write(&path, "[providers.qwen-code]\nmodel = \"qwen3-coder-flash\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "credlink",
            "--config",
            path.to_str().unwrap(),
            "models",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.providers.entry("qwen-code").model.as_deref(),
            Some("qwen3-coder-flash")
        );
    }
}
