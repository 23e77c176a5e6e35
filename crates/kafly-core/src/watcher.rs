// ── Configuration file watcher ──
//
// Watches the directory containing the configuration file and triggers a
// registry reload when the file changes. The directory is watched rather
// than the file itself because most editors replace the file via rename,
// which would silently detach a file-level watch.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::registry::ClusterRegistry;

/// Quiet period after the last relevant event before reloading. Editors
/// and atomic-rename writers emit bursts of events per logical save; the
/// window collapses each burst into one reload.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(350);

/// After a rename-style replace the file can be briefly absent. Poll for
/// it before reloading instead of failing on the gap.
const FILE_SETTLE_RETRIES: u32 = 10;
const FILE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Background task keeping a [`ClusterRegistry`] in sync with its
/// configuration file.
#[derive(Debug)]
pub struct ConfigWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    // Dropping the OS watcher stops event delivery, so it lives here for
    // the lifetime of the task.
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching the registry's configuration file.
    ///
    /// Fails if the containing directory does not exist or the OS watch
    /// cannot be established — both are startup errors worth dying on.
    pub fn spawn(registry: ClusterRegistry) -> Result<Self, CoreError> {
        let config_path = registry.config_path().to_path_buf();
        let dir = parent_dir(&config_path)
            .canonicalize()
            .map_err(|e| CoreError::Watch(e.to_string()))?;
        let file_name = config_path
            .file_name()
            .ok_or_else(|| CoreError::Watch("configuration path has no file name".into()))?;
        let watched_path = dir.join(file_name);

        // The notify callback runs on its own thread; it hands events to
        // the async loop through an unbounded channel.
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "filesystem watch error"),
            }
        })
        .map_err(|e| CoreError::Watch(e.to_string()))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| CoreError::Watch(e.to_string()))?;

        info!(path = %watched_path.display(), "watching configuration file");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(registry, watched_path, rx, cancel.clone()));

        Ok(Self {
            cancel,
            handle,
            _watcher: watcher,
        })
    }

    /// Stop the watcher and wait for the background task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// True for events that touch the configuration file itself and represent
/// a content change. Access/metadata-only events never trigger a reload.
fn is_relevant(event: &Event, config_path: &Path) -> bool {
    let kind_matters = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matters && event.paths.iter().any(|p| p == config_path)
}

async fn run_loop(
    registry: ClusterRegistry,
    config_path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
        };
        if !is_relevant(&event, &config_path) {
            continue;
        }
        debug!(kind = ?event.kind, "configuration change detected");

        // Debounce: every further relevant event pushes the deadline out.
        let mut deadline = Instant::now() + DEBOUNCE_WINDOW;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep_until(deadline) => break,
                ev = rx.recv() => match ev {
                    Some(ev) if is_relevant(&ev, &config_path) => {
                        deadline = Instant::now() + DEBOUNCE_WINDOW;
                    }
                    Some(_) => {}
                    None => return,
                },
            }
        }

        wait_for_file(&config_path).await;

        match registry.load_from_file().await {
            Ok(()) => info!(path = %config_path.display(), "configuration reloaded"),
            Err(e) => {
                warn!(error = %e, "configuration reload failed; keeping previous state");
            }
        }
    }
}

async fn wait_for_file(path: &Path) {
    for _ in 0..FILE_SETTLE_RETRIES {
        if tokio::fs::metadata(path).await.is_ok() {
            return;
        }
        tokio::time::sleep(FILE_SETTLE_DELAY).await;
    }
    debug!(path = %path.display(), "file still absent after settle window");
}

// ── Tests ────────────────────────────────────────────────────────────
