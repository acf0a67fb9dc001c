use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use kiln_materials::{FileSystemSource, HotReloadSink, MaterialSystemConfig};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{build_all, load_system, print_stats, report};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Watches the assets directory and reports changed source paths.
struct AssetWatcher {
    /// Kept alive for the duration of the watch.
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Event>,
    source: Arc<FileSystemSource>,
}

impl AssetWatcher {
    fn new(source: Arc<FileSystemSource>) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;
        watcher.watch(source.root(), RecursiveMode::Recursive)?;
        log::info!("Watching {:?}", source.root());

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
            source,
        })
    }

    /// Drain pending events into the set of changed source paths.
    fn poll_changes(&self) -> HashSet<String> {
        let mut changed = HashSet::new();
        while let Ok(event) = self.event_rx.try_recv() {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            changed.extend(event.paths.iter().filter_map(|p| self.source.to_source_path(p)));
        }
        changed
    }
}

pub fn run(assets: &Path, root: &str, config: MaterialSystemConfig) -> bool {
    let assets: PathBuf = match assets.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            log::error!("Cannot watch {:?}: {e}", assets);
            return false;
        }
    };
    let source = Arc::new(FileSystemSource::new(assets));

    let mut system = match load_system(source.clone(), root, config) {
        Ok(system) => system,
        Err(failure) => {
            println!("{root}: failed to load");
            report(&failure);
            return false;
        }
    };
    build_all(&system);

    let watcher = match AssetWatcher::new(source) {
        Ok(watcher) => watcher,
        Err(e) => {
            log::error!("Failed to start file watcher: {e}");
            return false;
        }
    };

    loop {
        std::thread::sleep(POLL_INTERVAL);
        let changed = watcher.poll_changes();
        if changed.is_empty() {
            continue;
        }

        if changed.iter().any(|path| system.files().contains(path)) {
            println!("documents changed, reloading");
            match system.reload() {
                Ok(()) => {
                    build_all(&system);
                }
                Err(failure) => report(&failure),
            }
        } else {
            let affected: usize = changed.iter().map(|path| system.file_changed(path)).sum();
            if affected == 0 {
                continue;
            }
            println!("{affected} material(s) affected, rebuilding");
            build_all(&system);
        }
        print_stats(&system);
    }
}
