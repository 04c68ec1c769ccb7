//! Hot-reload watcher for the template directory.
//!
//! Watches the directory for YAML changes, debounces per file, and feeds
//! changed files back into the [`TemplateStore`]. A file that stops parsing
//! leaves its previous template in effect — operators fix the file, the next
//! change event picks it up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::store::{TemplateStore, is_template_file};

/// Debounce interval: changes to the same file within this window coalesce.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Start watching `dir` and spawn the reload loop.
///
/// The returned task runs until the process exits or the watcher channel
/// closes. Dropping the handle does not stop the watcher; abort it for that.
///
/// # Errors
///
/// Returns an error if the filesystem watcher cannot be initialized or the
/// directory cannot be watched.
pub fn spawn_template_watcher(
    store: Arc<TemplateStore>,
    dir: &Path,
) -> PolicyResult<JoinHandle<()>> {
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.send(res);
        },
        notify::Config::default(),
    )
    .map_err(|e| PolicyError::InvalidTemplate(format!("filesystem watcher: {e}")))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| PolicyError::TemplateIo {
            path: dir.display().to_string(),
            source: std::io::Error::other(e),
        })?;
    info!(dir = %dir.display(), "watching template directory");

    Ok(tokio::spawn(run_loop(store, watcher, raw_rx)))
}

async fn run_loop(
    store: Arc<TemplateStore>,
    _watcher: RecommendedWatcher,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
) {
    let mut pending: HashMap<PathBuf, tokio::time::Instant> = HashMap::new();

    loop {
        let next_deadline = pending.values().copied().min();

        tokio::select! {
            biased;

            () = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let now = tokio::time::Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in ready {
                    pending.remove(&path);
                    apply_change(&store, &path);
                }
            }

            event = raw_rx.recv() => {
                match event {
                    Some(Ok(ev)) => queue_event(&ev, &mut pending),
                    Some(Err(e)) => warn!(error = %e, "filesystem watcher error"),
                    None => {
                        debug!("watcher channel closed, stopping template watcher");
                        break;
                    }
                }
            }
        }
    }
}

fn queue_event(event: &Event, pending: &mut HashMap<PathBuf, tokio::time::Instant>) {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {},
        _ => return,
    }
    for path in &event.paths {
        if !is_template_file(path) {
            continue;
        }
        debug!(file = %path.display(), kind = ?event.kind, "template file changed");
        let deadline = tokio::time::Instant::now().checked_add(DEFAULT_DEBOUNCE);
        if let Some(deadline) = deadline {
            pending.insert(path.clone(), deadline);
        }
    }
}

fn apply_change(store: &TemplateStore, path: &Path) {
    if path.exists() {
        match store.reload_file(path) {
            Ok(name) => info!(template = %name, file = %path.display(), "template reloaded"),
            Err(e) => warn!(file = %path.display(), error = %e, "template reload failed, previous version kept"),
        }
    } else {
        store.remove_file(path);
    }
}
