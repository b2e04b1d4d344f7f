//! Turns edits of the config file into [`ConfigEvent`]s.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    Changed { path: PathBuf },
}

pub struct ConfigWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn split_target(path: &Path) -> anyhow::Result<(PathBuf, OsString)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("config path has no filename"))?
        .to_os_string();
    Ok((dir, filename))
}

impl ConfigWatcher {
    /// Watch `path` with the default 500ms debounce.
    ///
    /// # Errors
    ///
    /// See [`ConfigWatcher::start_with_debounce`].
    pub fn start(path: &Path, tx: mpsc::Sender<ConfigEvent>) -> anyhow::Result<Self> {
        Self::start_with_debounce(path, DEFAULT_DEBOUNCE, tx)
    }

    /// Watch the parent directory and emit `Changed` for writes to the target file.
    ///
    /// Editors that save via rename still trigger an event because the directory,
    /// not the inode, is watched.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no filename or the directory cannot be watched.
    pub fn start_with_debounce(
        path: &Path,
        debounce: Duration,
        tx: mpsc::Sender<ConfigEvent>,
    ) -> anyhow::Result<Self> {
        let (dir, filename) = split_target(path)?;
        let target = path.to_path_buf();

        let (notify_tx, mut notify_rx) = mpsc::channel(16);

        let mut debouncer = new_debouncer(
            debounce,
            move |events: Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("config watcher error: {e}");
                        return;
                    }
                };

                let touched = events.iter().any(|e| {
                    e.kind == DebouncedEventKind::Any
                        && e.path.file_name().is_some_and(|n| n == filename)
                });

                if touched {
                    let _ = notify_tx.blocking_send(());
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&dir, notify::RecursiveMode::NonRecursive)?;
        tracing::debug!("watching {} for config changes", target.display());

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while notify_rx.recv().await.is_some() {
                tracing::info!("config file changed: {}", target.display());
                let event = ConfigEvent::Changed {
                    path: target.clone(),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { handle })
    }
}
