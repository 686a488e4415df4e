//! File watcher for the mounted configuration documents.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{Event, RecursiveMode, Watcher, recommended_watcher};
use tracing::{error, warn};

use crate::store::FileConfigStore;

/// Start watching the storage-systems and roles files with a simple
/// debounce (500ms). On change the store reloads and, if the new documents
/// validate, swaps its snapshot and bumps the generation channel.
///
/// Returns a thread join guard that keeps the watcher alive.
pub fn start_watcher(store: Arc<FileConfigStore>) -> Option<std::thread::JoinHandle<()>> {
    let paths = store.watched_paths();
    if paths.iter().any(|p| !p.exists()) {
        warn!("configuration file missing; watcher disabled");
        return None;
    }

    let handle = std::thread::spawn(move || {
        let last_reload = Arc::new(Mutex::new(Instant::now() - Duration::from_secs(1)));
        let lr = last_reload.clone();
        let reload_store = store.clone();

        let mut watcher = match recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(_event) => {
                    let mut last = lr.lock().unwrap();
                    let now = Instant::now();
                    if now.duration_since(*last) >= Duration::from_millis(500) {
                        *last = now;
                        reload_store.reload();
                    }
                }
                Err(e) => error!(error = %e, "configuration watch error"),
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to start configuration watcher");
                return;
            }
        };

        for path in &paths {
            if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
                error!(path = %path.display(), error = %e, "failed to watch configuration file");
                return;
            }
        }

        // Keep the watcher alive for the life of the process.
        loop {
            std::thread::park();
        }
    });

    Some(handle)
}
