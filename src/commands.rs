use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, bail};
use base64::Engine as _;
use snapsolve_core::config::Config;
use snapsolve_core::config_watcher::{ConfigEvent, ConfigWatcher};
use snapsolve_core::content::{Screenshot, SolutionResult};
use snapsolve_core::orchestrator::Orchestrator;
use snapsolve_llm::ProviderRegistry;
use snapsolve_llm::provider::LlmProvider;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use crate::{Overrides, load_config, output};

pub(crate) async fn providers(config: &Config, json: bool) -> anyhow::Result<()> {
    let registry = ProviderRegistry::with_builtin();
    let details = registry
        .all_providers_with_details(config.discovery_timeout())
        .await;
    output::print_providers(&details, json)
}

pub(crate) async fn check(config: &Config) -> anyhow::Result<()> {
    let provider = ProviderRegistry::with_builtin()
        .create_provider(&config.provider.id, config.provider_config())?;
    let name = &provider.descriptor().display_name;

    let models = config.resolved_models();
    if !provider.supports_vision(&models.extraction) {
        tracing::warn!(
            "extraction model {} may not accept images; pick a vision model",
            models.extraction
        );
    }

    if !provider.descriptor().requires_api_key {
        println!("{name} does not need an API key");
        return Ok(());
    }
    if provider.config().api_key.is_empty() {
        bail!("no API key configured for {name}; set provider.api_key or SNAPSOLVE_API_KEY");
    }
    if !provider.validate_api_key().await {
        bail!("{name} rejected the configured API key");
    }
    println!("{name}: API key is valid");
    Ok(())
}

pub(crate) async fn solve(config: Config, images: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let screenshots = load_screenshots(images)?;
    let (orchestrator, printer) = start(config)?;

    let ctrl_c = cancel_on_ctrl_c(Arc::clone(&orchestrator));
    let result = orchestrator.process_screenshots(screenshots).await;
    finish(orchestrator, ctrl_c, printer).await;

    match result {
        Ok(solution) => output::print_solution(&solution, json),
        Err(e) => bail!(e.user_message()),
    }
}

pub(crate) async fn debug(
    config: Config,
    previous: &Path,
    images: &[PathBuf],
    json: bool,
) -> anyhow::Result<()> {
    let previous = load_previous(previous)?;
    let screenshots = load_screenshots(images)?;
    let (orchestrator, printer) = start(config)?;

    let ctrl_c = cancel_on_ctrl_c(Arc::clone(&orchestrator));
    let result = orchestrator.debug(screenshots, &previous).await;
    finish(orchestrator, ctrl_c, printer).await;

    match result {
        Ok(result) => output::print_debug(&result, json),
        Err(e) => bail!(e.user_message()),
    }
}

pub(crate) async fn interactive(
    config: Config,
    config_path: PathBuf,
    overrides: Overrides,
) -> anyhow::Result<()> {
    let (orchestrator, _printer) = start(config)?;
    let last: Arc<Mutex<Option<SolutionResult>>> = Arc::default();

    let (config_tx, mut config_rx) = mpsc::channel(4);
    let _watcher = match ConfigWatcher::start(&config_path, config_tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("config hot-reload disabled: {e:#}");
            None
        }
    };

    println!("snapsolve v{} ({})", env!("CARGO_PKG_VERSION"), orchestrator.provider_id());
    println!("Enter screenshot paths to solve, `debug <paths>` to fix the last answer,");
    println!("`cancel` to stop the current run, `quit` to exit.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Cancel => orchestrator.cancel(),
                    Input::Solve(paths) => {
                        spawn_solve(Arc::clone(&orchestrator), paths, Arc::clone(&last));
                    }
                    Input::Debug(paths) => {
                        let previous = last.lock().unwrap_or_else(PoisonError::into_inner).clone();
                        match previous {
                            Some(previous) => {
                                spawn_debug(Arc::clone(&orchestrator), paths, previous);
                            }
                            None => eprintln!("nothing to debug yet, solve a task first"),
                        }
                    }
                }
            }
            Some(ConfigEvent::Changed { path }) = config_rx.recv() => {
                reload(&orchestrator, &path, &overrides);
            }
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel();
                break;
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Cancel,
    Solve(Vec<PathBuf>),
    Debug(Vec<PathBuf>),
}

fn parse_line(line: &str) -> Input {
    let mut words = line.split_whitespace();
    match words.next() {
        None => Input::Empty,
        Some("quit" | "exit") => Input::Quit,
        Some("cancel") => Input::Cancel,
        Some("debug") => Input::Debug(words.map(PathBuf::from).collect()),
        Some(first) => Input::Solve(
            std::iter::once(first)
                .chain(words)
                .map(PathBuf::from)
                .collect(),
        ),
    }
}

fn reload(orchestrator: &Orchestrator, path: &Path, overrides: &Overrides) {
    let config = match load_config(path, overrides.provider.as_deref(), overrides.language.as_deref())
    {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("config reload failed, keeping current settings: {e:#}");
            return;
        }
    };
    match orchestrator.apply_config(config) {
        Ok(()) => tracing::info!("config reloaded, provider {}", orchestrator.provider_id()),
        Err(e) => tracing::warn!("config reload rejected: {e}"),
    }
}

fn spawn_solve(
    orchestrator: Arc<Orchestrator>,
    paths: Vec<PathBuf>,
    last: Arc<Mutex<Option<SolutionResult>>>,
) {
    tokio::spawn(async move {
        let screenshots = match load_screenshots(&paths) {
            Ok(screenshots) => screenshots,
            Err(e) => {
                eprintln!("error: {e:#}");
                return;
            }
        };
        match orchestrator.process_screenshots(screenshots).await {
            Ok(solution) => {
                if let Err(e) = output::print_solution(&solution, false) {
                    tracing::error!("failed to print solution: {e:#}");
                }
                *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(solution);
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    });
}

fn spawn_debug(orchestrator: Arc<Orchestrator>, paths: Vec<PathBuf>, previous: SolutionResult) {
    tokio::spawn(async move {
        let screenshots = match load_screenshots(&paths) {
            Ok(screenshots) => screenshots,
            Err(e) => {
                eprintln!("error: {e:#}");
                return;
            }
        };
        match orchestrator.debug(screenshots, &previous).await {
            Ok(result) => {
                if let Err(e) = output::print_debug(&result, false) {
                    tracing::error!("failed to print debug result: {e:#}");
                }
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    });
}

fn start(config: Config) -> anyhow::Result<(Arc<Orchestrator>, tokio::task::JoinHandle<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(config, ProviderRegistry::with_builtin(), tx)
        .context("failed to create provider")?;
    tracing::info!("using provider {}", orchestrator.provider_id());
    let printer = tokio::spawn(output::print_progress(rx));
    Ok((Arc::new(orchestrator), printer))
}

fn cancel_on_ctrl_c(orchestrator: Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received ctrl-c, cancelling");
        orchestrator.cancel();
    })
}

/// Stop the ctrl-c listener and wait until the progress printer has drained.
async fn finish(
    orchestrator: Arc<Orchestrator>,
    ctrl_c: tokio::task::JoinHandle<()>,
    printer: tokio::task::JoinHandle<()>,
) {
    ctrl_c.abort();
    let _ = ctrl_c.await;
    drop(orchestrator);
    let _ = printer.await;
}

fn load_screenshots(paths: &[PathBuf]) -> anyhow::Result<Vec<Screenshot>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read screenshot {}", path.display()))?;
            let data = base64::engine::general_purpose::STANDARD.encode(bytes);
            Ok(Screenshot::new(path.display().to_string(), data))
        })
        .collect()
}

/// JSON written by `solve --json`, or any other file taken as the code itself.
fn load_previous(path: &Path) -> anyhow::Result<SolutionResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read previous solution {}", path.display()))?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| SolutionResult {
        code: text,
        ..SolutionResult::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interactive_lines() {
        assert_eq!(parse_line("   "), Input::Empty);
        assert_eq!(parse_line("quit"), Input::Quit);
        assert_eq!(parse_line("cancel"), Input::Cancel);
        assert_eq!(
            parse_line("a.png  b.png"),
            Input::Solve(vec!["a.png".into(), "b.png".into()])
        );
        assert_eq!(
            parse_line("debug err.png"),
            Input::Debug(vec!["err.png".into()])
        );
    }

    #[test]
    fn screenshots_are_base64_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"hello").unwrap();

        let shots = load_screenshots(std::slice::from_ref(&path)).unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].base64_data, "aGVsbG8=");
        assert_eq!(shots[0].mime_type(), "image/png");
    }

    #[test]
    fn missing_screenshot_is_error() {
        let err = load_screenshots(&[PathBuf::from("/nonexistent/shot.png")]).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read screenshot"));
    }

    #[test]
    fn previous_from_json_or_source() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("prev.json");
        std::fs::write(
            &json,
            r#"{"code":"x = 1","thoughts":["t"],"time_complexity":"O(1)","space_complexity":"O(1)","issues":[]}"#,
        )
        .unwrap();
        let previous = load_previous(&json).unwrap();
        assert_eq!(previous.code, "x = 1");
        assert_eq!(previous.thoughts, ["t"]);

        let source = dir.path().join("prev.py");
        std::fs::write(&source, "print('hi')\n").unwrap();
        assert_eq!(load_previous(&source).unwrap().code, "print('hi')\n");
    }
}
