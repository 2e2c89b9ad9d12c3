//! Output directory observation
//!
//! Polls the date-partitioned output tree and publishes a [`MediaEvent`] for
//! every newly visible artifact. Temporary and hidden names never match, so
//! an artifact is only ever observed after its atomic rename. Bursts may
//! coalesce into one poll cycle, but nothing is silently dropped: the event
//! channel is awaited, not try-sent.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use perch_core::{MediaEvent, MediaKind};

pub struct OutputWatcher;

impl OutputWatcher {
    /// Start observing `root`. The initial scan seeds the known set without
    /// emitting, so a restart does not replay the whole gallery.
    pub fn start(root: PathBuf, poll_interval: Duration) -> mpsc::Receiver<MediaEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let seed_root = root.clone();
            let mut known = tokio::task::spawn_blocking(move || scan_tree(&seed_root))
                .await
                .unwrap_or_default();
            debug!(existing = known.len(), root = %root.display(), "output watcher started");

            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                let scan_root = root.clone();
                let current = match tokio::task::spawn_blocking(move || scan_tree(&scan_root)).await
                {
                    Ok(current) => current,
                    Err(_) => continue,
                };
                for path in current.difference(&known) {
                    if let Some(kind) = classify(path) {
                        debug!(path = %path.display(), %kind, "new artifact observed");
                        if tx
                            .send(MediaEvent {
                                path: path.clone(),
                                kind,
                            })
                            .await
                            .is_err()
                        {
                            return; // consumer gone
                        }
                    }
                }
                known = current;
            }
        });
        rx
    }
}

/// Artifact kind from a file name. Hidden and temporary names are not
/// artifacts.
fn classify(path: &Path) -> Option<MediaKind> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') || name.ends_with(".tmp") {
        return None;
    }
    match path.extension()?.to_str()? {
        "jpg" | "jpeg" => Some(MediaKind::Photo),
        "mp4" => Some(MediaKind::Video),
        _ => None,
    }
}

/// Walk the two-level `root/YYYY-MM-DD/<artifact>` tree.
fn scan_tree(root: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    let Ok(days) = std::fs::read_dir(root) else {
        return files;
    };
    for day in days.flatten() {
        let day_path = day.path();
        if !day_path.is_dir() {
            continue;
        }
        if let Ok(entries) = std::fs::read_dir(&day_path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.insert(path);
                }
            }
        }
    }
    files
}
