//! Directory watching front-end
//!
//! One `notify` watcher per configured directory, each serviced by its own
//! thread. The thread owns the watcher and forwards `(path, created,
//! modified)` into the orchestrator callback; scan work therefore runs on
//! the watcher thread, so events from one directory are processed strictly
//! in order.

use crate::{VigilError, VigilResult};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Callback invoked per file event. Flags mirror the OS event classes:
/// `created` for add/rename-to, `modified` for write/rename-to.
pub type FileEventCallback = Arc<dyn Fn(&Path, bool, bool) + Send + Sync>;

/// Running watcher over one directory.
pub struct WatcherHandle {
    pub dir: PathBuf,
    thread: JoinHandle<()>,
}

impl WatcherHandle {
    /// Block until the watcher thread exits (it normally never does).
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Spawn a watcher thread over `dir`.
pub fn watch_directory(
    dir: &Path,
    recursive: bool,
    cb: FileEventCallback,
) -> VigilResult<WatcherHandle> {
    if !dir.is_dir() {
        return Err(VigilError::Watch(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let _ = tx.send(res);
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )
    .map_err(|e| VigilError::Watch(e.to_string()))?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(dir, mode)
        .map_err(|e| VigilError::Watch(e.to_string()))?;

    let dir_owned = dir.to_path_buf();
    let thread = std::thread::spawn(move || {
        // The watcher must live exactly as long as this loop.
        let _watcher = watcher;
        for res in rx {
            let event = match res {
                Ok(e) => e,
                Err(e) => {
                    error!(dir = %dir_owned.display(), msg = %e, "watch error");
                    continue;
                }
            };
            let Some((created, modified)) = classify(&event.kind) else {
                continue;
            };
            for path in &event.paths {
                cb(path, created, modified);
            }
        }
        debug!(dir = %dir_owned.display(), "watcher channel closed");
    });

    Ok(WatcherHandle {
        dir: dir.to_path_buf(),
        thread,
    })
}

/// Map an OS event class onto `(created, modified)`. Events with no triage
/// value (removal, access, rename-from) are dropped.
fn classify(kind: &EventKind) -> Option<(bool, bool)> {
    match kind {
        EventKind::Create(_) => Some((true, false)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some((true, true)),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some((false, true)),
        _ => None,
    }
}
