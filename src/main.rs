mod commands;
mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use snapsolve_core::config::Config;

/// Solve programming tasks from screenshots with a vision-capable LLM.
#[derive(Parser)]
#[command(name = "snapsolve", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file; falls back to SNAPSOLVE_CONFIG, then config/default.toml
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Provider id overriding the config file
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Target language for solutions
    #[arg(short, long, global = true)]
    language: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered providers and the models they offer
    Providers {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check that the configured provider accepts the API key
    Check,

    /// Extract and solve the task shown in the screenshots
    Solve {
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fix a previous solution using screenshots of what went wrong
    Debug {
        /// Previous result: JSON from `solve --json` or a plain source file
        #[arg(long, value_name = "FILE")]
        previous: PathBuf,

        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Read screenshot paths from stdin and reload the config when it changes
    Interactive,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path, cli.provider.as_deref(), cli.language.as_deref())?;
    tracing::debug!("loaded config from {}", config_path.display());

    match cli.command {
        Command::Providers { json } => commands::providers(&config, json).await,
        Command::Check => commands::check(&config).await,
        Command::Solve { images, json } => commands::solve(config, &images, json).await,
        Command::Debug {
            previous,
            images,
            json,
        } => commands::debug(config, &previous, &images, json).await,
        Command::Interactive => {
            let overrides = Overrides {
                provider: cli.provider,
                language: cli.language,
            };
            commands::interactive(config, config_path, overrides).await
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SNAPSOLVE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// Command-line values that win over both the file and the environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub provider: Option<String>,
    pub language: Option<String>,
}

pub(crate) fn load_config(
    path: &Path,
    provider: Option<&str>,
    language: Option<&str>,
) -> anyhow::Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Some(id) = provider {
        config.provider.id = id.trim().to_lowercase();
    }
    if let Some(language) = language {
        config.pipeline.language = language.trim().to_owned();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn config_path_precedence() {
        unsafe { std::env::remove_var("SNAPSOLVE_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));

        unsafe { std::env::set_var("SNAPSOLVE_CONFIG", "/etc/snapsolve.toml") };
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/snapsolve.toml"));
        assert_eq!(
            resolve_config_path(Some(Path::new("local.toml"))),
            PathBuf::from("local.toml")
        );
        unsafe { std::env::remove_var("SNAPSOLVE_CONFIG") };
    }

    #[test]
    #[serial]
    fn cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[provider]\nid = \"openai\"\n[pipeline]\nlanguage = \"java\"\n")
            .unwrap();
        unsafe {
            std::env::remove_var("SNAPSOLVE_PROVIDER");
            std::env::remove_var("SNAPSOLVE_LANGUAGE");
        }

        let config = load_config(&path, Some(" Gemini "), Some("go")).unwrap();
        assert_eq!(config.provider.id, "gemini");
        assert_eq!(config.pipeline.language, "go");
    }

    #[test]
    #[serial]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[provider]\nchat_timeout_secs = 0\n").unwrap();
        unsafe { std::env::remove_var("SNAPSOLVE_CHAT_TIMEOUT") };
        assert!(load_config(&path, None, None).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["snapsolve", "--provider", "gemini", "solve", "a.png", "b.png"])
            .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("gemini"));
        let Command::Solve { images, json } = cli.command else {
            panic!("expected solve");
        };
        assert_eq!(images.len(), 2);
        assert!(!json);

        assert!(Cli::try_parse_from(["snapsolve", "solve"]).is_err());
    }
}
