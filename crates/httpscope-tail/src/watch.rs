//! Change-notification sources driving the tail monitor

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// What happened to a watched path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Content changed (grew, shrank or was rewritten)
    Modified,
    /// Path was deleted or now refers to a different file
    Removed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Modified,
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Removed,
        }
    }
}

/// Source of file change events
pub trait WatchSource: Send {
    /// Start reporting changes for `path`. Watching an already watched path
    /// resets its baseline.
    fn watch(&mut self, path: &Path) -> io::Result<()>;

    /// Stop reporting changes for `path`
    fn unwatch(&mut self, path: &Path);

    /// Wait up to `timeout` for the next event
    fn next_event(&mut self, timeout: Duration) -> Option<WatchEvent>;
}

// ============================================================================
// Polling
// ============================================================================

/// Size, mtime and identity of a file at one poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
    identity: Option<(u64, u64)>,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
            identity: file_identity(meta),
        }
    }
}

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}

/// Watches paths by stat-ing them once per interval
pub struct PollWatcher {
    interval: Duration,
    /// Last stamp per path; `None` while the path is missing
    watched: HashMap<PathBuf, Option<FileStamp>>,
    pending: VecDeque<WatchEvent>,
    last_poll: Option<Instant>,
}

impl PollWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            watched: HashMap::new(),
            pending: VecDeque::new(),
            last_poll: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stat every watched path and queue events for the ones that changed
    fn poll(&mut self) {
        for (path, last) in self.watched.iter_mut() {
            let current = fs::metadata(path).ok().map(|meta| FileStamp::of(&meta));

            let kind = match (*last, current) {
                (Some(_), None) => Some(WatchEventKind::Removed),
                (Some(old), Some(new)) if old.identity != new.identity => {
                    Some(WatchEventKind::Removed)
                }
                (Some(old), Some(new)) if old != new => Some(WatchEventKind::Modified),
                (None, Some(_)) => Some(WatchEventKind::Modified),
                _ => None,
            };

            if let Some(kind) = kind {
                tracing::trace!(path = %path.display(), ?kind, "poll detected change");
                self.pending.push_back(WatchEvent {
                    path: path.clone(),
                    kind,
                });
            }
            *last = current;
        }
        self.last_poll = Some(Instant::now());
    }
}

impl WatchSource for PollWatcher {
    fn watch(&mut self, path: &Path) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        self.watched
            .insert(path.to_path_buf(), Some(FileStamp::of(&meta)));
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) {
        self.watched.remove(path);
        self.pending.retain(|event| event.path != path);
    }

    fn next_event(&mut self, timeout: Duration) -> Option<WatchEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        if let Some(last) = self.last_poll {
            let due = last + self.interval;
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    return None;
                }
                thread::sleep(wait);
            }
        }

        self.poll();
        self.pending.pop_front()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Sending half of a [`ChannelWatcher`]
#[derive(Clone)]
pub struct WatchSender {
    tx: mpsc::Sender<WatchEvent>,
}

impl WatchSender {
    /// Push an event; returns false once the watcher is gone
    pub fn send(&self, event: WatchEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Yields events pushed from elsewhere, e.g. a native notification backend
pub struct ChannelWatcher {
    rx: mpsc::Receiver<WatchEvent>,
    watched: HashSet<PathBuf>,
}

impl ChannelWatcher {
    pub fn new() -> (Self, WatchSender) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                watched: HashSet::new(),
            },
            WatchSender { tx },
        )
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }
}

impl WatchSource for ChannelWatcher {
    fn watch(&mut self, path: &Path) -> io::Result<()> {
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) {
        self.watched.remove(path);
    }

    fn next_event(&mut self, timeout: Duration) -> Option<WatchEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(event) if self.watched.contains(&event.path) => return Some(event),
                Ok(event) => {
                    tracing::trace!(path = %event.path.display(), "ignoring event for unwatched path");
                }
                Err(_) => return None,
            }
        }
    }
}

// ============================================================================
// Native notifications
// ============================================================================

/// Map a native event kind onto what the monitor cares about
fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Remove(_) => Some(WatchEventKind::Removed),
        // The watched inode moved away, i.e. rotation by rename
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEventKind::Removed),
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
            Some(WatchEventKind::Modified)
        }
        EventKind::Access(_) | EventKind::Other => None,
    }
}

fn notify_error(err: notify::Error) -> io::Error {
    io::Error::other(err)
}

/// OS change notifications (inotify, kqueue, ...) feeding a [`ChannelWatcher`]
///
/// Deleting a file that is still held open only raises a metadata change,
/// so every event is checked against the identity recorded by `watch`.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    events: ChannelWatcher,
    /// Device and inode per watched path at the time it was watched
    identities: HashMap<PathBuf, Option<(u64, u64)>>,
}

impl NotifyWatcher {
    pub fn new() -> io::Result<Self> {
        let (events, sender) = ChannelWatcher::new();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let Some(kind) = classify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        sender.send(WatchEvent { path, kind });
                    }
                }
                Err(err) => tracing::warn!(error = %err, "file notification error"),
            }
        })
        .map_err(notify_error)?;

        Ok(Self {
            watcher,
            events,
            identities: HashMap::new(),
        })
    }

    /// Decide the event kind from what the path refers to now
    fn resolve(&self, event: WatchEvent) -> WatchEvent {
        let recorded = self.identities.get(&event.path).copied().flatten();
        let kind = match fs::metadata(&event.path) {
            Err(_) => WatchEventKind::Removed,
            Ok(meta) => match (recorded, file_identity(&meta)) {
                (Some(old), Some(new)) if old != new => WatchEventKind::Removed,
                // Still the watched file, e.g. a late event for a replaced one
                (Some(_), Some(_)) => WatchEventKind::Modified,
                _ => event.kind,
            },
        };
        if kind != event.kind {
            tracing::trace!(path = %event.path.display(), ?kind, "event kind corrected by stat");
        }
        WatchEvent { kind, ..event }
    }
}

impl WatchSource for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(notify_error)?;
        self.identities
            .insert(path.to_path_buf(), file_identity(&meta));
        self.events.watch(path)
    }

    fn unwatch(&mut self, path: &Path) {
        // The OS drops the watch itself once the file is gone
        if let Err(err) = self.watcher.unwatch(path) {
            tracing::trace!(path = %path.display(), error = %err, "unwatch failed");
        }
        self.identities.remove(path);
        self.events.unwatch(path);
    }

    fn next_event(&mut self, timeout: Duration) -> Option<WatchEvent> {
        let event = self.events.next_event(timeout)?;
        Some(self.resolve(event))
    }
}
