//! Filesystem watcher feeding a single consumer thread.
//!
//! `notify` delivers raw events on a std channel; one named thread drains it
//! and hands `(path, kind)` pairs to the handler one at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::BackendError;
use crate::types::FileEventKind;

/// A running watcher. Stops on drop.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    stop: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Watch `root` recursively and call `handler` for every relevant event.
    ///
    /// `on_exit` runs on the consumer thread after its loop ends, so it can
    /// release per-thread resources the handler acquired.
    pub fn start<F, E>(
        root: &Path,
        poll_interval: Duration,
        handler: F,
        on_exit: E,
    ) -> Result<Self, BackendError>
    where
        F: Fn(PathBuf, FileEventKind) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let consumer = thread::Builder::new()
            .name("tagtrace-watch".to_string())
            .spawn(move || {
                loop {
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    match rx.recv_timeout(poll_interval) {
                        Ok(Ok(event)) => {
                            for (path, kind) in classify(&event) {
                                handler(path, kind);
                            }
                        }
                        Ok(Err(e)) => warn!("File watcher error: {e}"),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                on_exit();
            })?;

        info!(root = %root.display(), "Watching for file changes");
        Ok(Self {
            watcher: Some(watcher),
            stop,
            consumer: Some(consumer),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Dropping the watcher closes the channel
        self.watcher.take();
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                warn!("File watcher consumer panicked");
            }
            debug!("File watcher stopped");
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map a notify event to per-path sync events. Access and other
/// metadata-free events are dropped.
pub fn classify(event: &Event) -> Vec<(PathBuf, FileEventKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Remove(_) => Some(FileEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| {
            // Renames report both ends; whichever still exists was modified
            let kind = kind.unwrap_or(if path.exists() {
                FileEventKind::Modified
            } else {
                FileEventKind::Deleted
            });
            (path.clone(), kind)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_classify_kinds() {
        let p = PathBuf::from("/tmp/definitely-missing/a.md");

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(p.clone());
        assert_eq!(classify(&created), vec![(p.clone(), FileEventKind::Created)]);

        let modified =
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(p.clone());
        assert_eq!(classify(&modified), vec![(p.clone(), FileEventKind::Modified)]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(p.clone());
        assert_eq!(classify(&removed), vec![(p.clone(), FileEventKind::Deleted)]);

        let accessed = Event::new(EventKind::Access(AccessKind::Any)).add_path(p.clone());
        assert!(classify(&accessed).is_empty());
    }

    #[test]
    fn test_classify_rename() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.md");
        let new = dir.path().join("new.md");
        std::fs::write(&new, "@REQ:A1").unwrap();

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(old.clone())
            .add_path(new.clone());
        assert_eq!(
            classify(&event),
            vec![
                (old, FileEventKind::Deleted),
                (new, FileEventKind::Modified)
            ]
        );
    }

    #[test]
    fn test_watcher_delivers_events() {
        let dir = TempDir::new().unwrap();
        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
        let sink = Arc::clone(&seen);

        let exited = Arc::new(AtomicBool::new(false));
        let exit_flag = Arc::clone(&exited);

        let watcher = FileWatcher::start(
            dir.path(),
            Duration::from_millis(20),
            move |path, _| sink.lock().unwrap().push(path),
            move || exit_flag.store(true, Ordering::SeqCst),
        )
        .unwrap();

        std::fs::write(dir.path().join("a.md"), "@REQ:A1").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        watcher.stop();
        assert!(exited.load(Ordering::SeqCst));

        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == "a.md")));
    }
}
