//! Policy file watcher.
//!
//! A policy change invalidates any recommendation computed under the old
//! policy. Recommendations never outlive the tick that computed them, so
//! there is nothing to clear; the watcher reports the change for operator
//! visibility and otherwise stays out of the control loops' way.
//!
//! The parent directory is watched rather than the file itself so that
//! editors which save by rename-and-replace are still seen. On Linux this
//! uses inotify from a dedicated thread that reads the non-blocking
//! descriptor and backs off while idle, so dropping the receiver releases
//! both the thread and the descriptor; elsewhere the file's modification
//! time is polled once per second.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Created,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Subscribe to changes of the file at `path`.
///
/// The stream is infinite; once it yields an error or closes, a new
/// subscription is needed.
pub fn watch_for_change(path: &Path) -> io::Result<mpsc::Receiver<io::Result<ChangeEvent>>> {
    platform::watch(path)
}

/// Log every change to the policy file until shutdown.
pub async fn run_policy_watcher(path: PathBuf, mut shutdown: watch::Receiver<bool>) {
    let mut events = match watch_for_change(&path) {
        Ok(events) => events,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to watch policy file");
            return;
        }
    };
    info!(path = %path.display(), "policy watcher started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    warn!(
                        path = %event.path.display(),
                        kind = ?event.kind,
                        "policy changed; recommendations computed under the old policy are discarded"
                    );
                }
                Some(Err(e)) => {
                    error!(error = %e, path = %path.display(), "policy watcher failed");
                    break;
                }
                None => {
                    warn!(path = %path.display(), "policy watcher stream closed");
                    break;
                }
            },
            _ = shutdown.changed() => {
                info!("policy watcher shutting down");
                break;
            }
        }
    }
}

fn split_path(path: &Path) -> io::Result<(PathBuf, std::ffi::OsString)> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_os_string()))
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;

    use inotify::{EventMask, Inotify, WatchMask};

    use std::thread::JoinHandle;
    use std::time::Duration;

    /// How long the reader sleeps when no events are queued.
    const READ_BACKOFF: Duration = Duration::from_millis(250);

    pub fn watch(path: &Path) -> io::Result<mpsc::Receiver<io::Result<ChangeEvent>>> {
        spawn_reader(path).map(|(rx, _)| rx)
    }

    /// Start the reader thread. It owns the inotify descriptor and exits,
    /// closing it, within one backoff of the receiver being dropped.
    pub(super) fn spawn_reader(
        path: &Path,
    ) -> io::Result<(mpsc::Receiver<io::Result<ChangeEvent>>, JoinHandle<()>)> {
        let (dir, name) = split_path(path)?;
        let mut inotify = Inotify::init()?;
        inotify.watches().add(
            &dir,
            WatchMask::CLOSE_WRITE | WatchMask::MOVED_TO | WatchMask::CREATE | WatchMask::DELETE,
        )?;

        let (tx, rx) = mpsc::channel(16);
        let path = path.to_path_buf();
        let handle = std::thread::spawn(move || {
            // Must hold at least `sizeof(struct inotify_event) + NAME_MAX + 1`.
            let mut buf = [0u8; 4096];
            while !tx.is_closed() {
                let events = match inotify.read_events(&mut buf) {
                    Ok(events) => events,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(READ_BACKOFF);
                        continue;
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        return;
                    }
                };
                for event in events {
                    if event.name != Some(name.as_os_str()) {
                        continue;
                    }
                    let kind = if event.mask.contains(EventMask::DELETE) {
                        ChangeKind::Removed
                    } else if event.mask.contains(EventMask::CREATE) {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Modified
                    };
                    let change = ChangeEvent {
                        path: path.clone(),
                        kind,
                    };
                    if tx.blocking_send(Ok(change)).is_err() {
                        return;
                    }
                }
            }
        });
        Ok((rx, handle))
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use super::*;

    use std::time::{Duration, SystemTime};

    fn modified(path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    pub fn watch(path: &Path) -> io::Result<mpsc::Receiver<io::Result<ChangeEvent>>> {
        split_path(path)?;
        let (tx, rx) = mpsc::channel(16);
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let mut last = modified(&path);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let now = modified(&path);
                if now == last {
                    continue;
                }
                let kind = match (last, now) {
                    (None, Some(_)) => ChangeKind::Created,
                    (Some(_), None) => ChangeKind::Removed,
                    _ => ChangeKind::Modified,
                };
                last = now;
                let change = ChangeEvent {
                    path: path.clone(),
                    kind,
                };
                if tx.send(Ok(change)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
