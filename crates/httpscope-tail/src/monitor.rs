use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use httpscope_logs::{LogParser, Transport};
use tokio_util::sync::CancellationToken;

use crate::error::TailError;
use crate::watch::{WatchEvent, WatchEventKind, WatchSource};

/// Trailing bytes re-scanned when a file is first registered
pub const DEFAULT_BACKREAD: u64 = 1024;

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Bytes before end-of-file to start reading from on registration
    pub backread: u64,
    /// Delay between a removal and the re-registration attempt
    pub backoff: Duration,
    /// Longest wait for a watch event before the stop flag is re-checked
    pub wait_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backread: DEFAULT_BACKREAD,
            backoff: Duration::from_secs(2),
            wait_timeout: Duration::from_secs(1),
        }
    }
}

/// Per-path lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailState {
    Unregistered,
    Tailing,
    /// Terminal for this path
    Error,
}

/// Line counters shared with the display
#[derive(Debug, Default)]
pub struct MonitorStats {
    delivered: AtomicU64,
    unmatched: AtomicU64,
}

impl MonitorStats {
    /// Records handed to the transport
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Lines the parser did not recognise
    pub fn unmatched(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}

/// Cloneable handle for requesting a cooperative stop
#[derive(Clone, Debug)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct TailedFile {
    path: PathBuf,
    state: TailState,
    file: Option<File>,
    offset: u64,
    /// Re-registration deadline after a removal
    retry_at: Option<Instant>,
}

impl TailedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: TailState::Unregistered,
            file: None,
            offset: 0,
            retry_at: None,
        }
    }
}

/// Outcome of reading one file from its offset to end-of-file
#[derive(Default)]
struct Drained {
    bytes: u64,
    records: usize,
}

/// Follows a set of growing files and forwards every parsed line
pub struct TailMonitor<P, T, W> {
    files: Vec<TailedFile>,
    parser: P,
    transport: T,
    source: W,
    config: MonitorConfig,
    cancel: CancellationToken,
    stats: Arc<MonitorStats>,
}

impl<P, T, W> TailMonitor<P, T, W>
where
    P: LogParser,
    T: Transport,
    W: WatchSource,
{
    /// Validate the inputs. Fails before anything is opened when no path is
    /// given or a path is not an existing regular file.
    pub fn new(
        paths: Vec<PathBuf>,
        parser: P,
        transport: T,
        source: W,
        config: MonitorConfig,
    ) -> Result<Self, TailError> {
        if paths.is_empty() {
            return Err(TailError::NoPaths);
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TailError::NotFound(path));
                }
                Err(err) => return Err(TailError::io(path, err)),
            };
            if !meta.is_file() {
                return Err(TailError::NotAFile(path));
            }
            if files.iter().any(|f: &TailedFile| f.path == path) {
                tracing::debug!(path = %path.display(), "ignoring duplicate path");
                continue;
            }
            files.push(TailedFile::new(path));
        }

        Ok(Self {
            files,
            parser,
            transport,
            source,
            config,
            cancel: CancellationToken::new(),
            stats: Arc::new(MonitorStats::default()),
        })
    }

    /// Use an externally owned token for cooperative stop
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.cancel.clone(),
        }
    }

    pub fn stats(&self) -> Arc<MonitorStats> {
        Arc::clone(&self.stats)
    }

    pub fn source(&self) -> &W {
        &self.source
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn state(&self, path: &Path) -> Option<TailState> {
        self.index_of(path).map(|idx| self.files[idx].state)
    }

    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.index_of(path).map(|idx| self.files[idx].offset)
    }

    /// Whether `path` was removed and waits out its backoff
    pub fn retry_pending(&self, path: &Path) -> bool {
        self.index_of(path)
            .is_some_and(|idx| self.files[idx].retry_at.is_some())
    }

    /// Number of paths currently being tailed, including ones in backoff
    pub fn active(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.state == TailState::Tailing)
            .count()
    }

    /// Register every path that has not been registered yet. Returns the
    /// number of paths being tailed afterwards.
    pub fn register_all(&mut self) -> usize {
        for idx in 0..self.files.len() {
            if self.files[idx].state == TailState::Unregistered {
                self.register(idx);
            }
        }
        self.active()
    }

    /// Wait up to `timeout` for one watch event and handle it, then retry
    /// removed paths whose backoff has elapsed. Returns whether an event
    /// arrived.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        self.retry_due();

        let wait = match self.next_retry() {
            Some(at) => timeout.min(at.saturating_duration_since(Instant::now())),
            None => timeout,
        };
        let arrived = match self.source.next_event(wait) {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        };

        self.retry_due();
        arrived
    }

    /// Blocking loop. Returns once stopped or once no path is left to tail.
    pub fn run(&mut self) {
        let active = self.register_all();
        tracing::info!(active, total = self.files.len(), "tail monitor started");

        while !self.cancel.is_cancelled() {
            if self.active() == 0 {
                tracing::warn!("no files left to tail, stopping monitor");
                break;
            }
            self.pump(self.config.wait_timeout);
        }

        self.release_all();
        tracing::info!(
            delivered = self.stats.delivered(),
            unmatched = self.stats.unmatched(),
            "tail monitor stopped"
        );
    }

    /// Request a stop and drop every watch right away
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.release_all();
    }

    fn index_of(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|f| f.path == path)
    }

    fn release_all(&mut self) {
        for entry in &mut self.files {
            if entry.state == TailState::Tailing {
                self.source.unwatch(&entry.path);
                entry.file = None;
                entry.retry_at = None;
            }
        }
    }

    fn handle_event(&mut self, event: WatchEvent) {
        let Some(idx) = self.index_of(&event.path) else {
            tracing::trace!(path = %event.path.display(), "event for unknown path");
            return;
        };
        let entry = &self.files[idx];
        if entry.state != TailState::Tailing || entry.retry_at.is_some() {
            tracing::trace!(path = %event.path.display(), "event for inactive path");
            return;
        }

        match event.kind {
            WatchEventKind::Modified => {
                if let Err(err) = self.process(idx) {
                    self.fail(idx, &err);
                }
            }
            WatchEventKind::Removed => self.recover(idx),
        }
    }

    fn register(&mut self, idx: usize) {
        if let Err(err) = self.try_register(idx) {
            self.fail(idx, &err);
        }
    }

    fn try_register(&mut self, idx: usize) -> Result<(), TailError> {
        let entry = &mut self.files[idx];
        let file = File::open(&entry.path).map_err(|e| TailError::io(&entry.path, e))?;
        let len = file
            .metadata()
            .map_err(|e| TailError::io(&entry.path, e))?
            .len();

        entry.offset = len.saturating_sub(self.config.backread);
        entry.file = Some(file);
        entry.state = TailState::Tailing;
        tracing::info!(path = %entry.path.display(), offset = entry.offset, "registered");

        // Watch before the first drain so writes landing in between still raise an event
        self.source
            .watch(&entry.path)
            .map_err(|e| TailError::io(&entry.path, e))?;

        self.process(idx)?;
        Ok(())
    }

    fn fail(&mut self, idx: usize, err: &TailError) {
        let entry = &mut self.files[idx];
        tracing::warn!(path = %entry.path.display(), error = %err, "tailing failed");
        entry.state = TailState::Error;
        entry.file = None;
        self.source.unwatch(&entry.path);
    }

    /// Deliver every complete line available past the stored offset,
    /// resetting to the start when the file shrank below it.
    fn process(&mut self, idx: usize) -> Result<usize, TailError> {
        let entry = &mut self.files[idx];
        let mut drained = drain(entry, &self.parser, &self.transport, &self.stats)?;

        if drained.bytes == 0 {
            let len = match &entry.file {
                Some(file) => file
                    .metadata()
                    .map_err(|e| TailError::io(&entry.path, e))?
                    .len(),
                None => return Ok(0),
            };
            if len < entry.offset {
                tracing::warn!(
                    path = %entry.path.display(),
                    offset = entry.offset,
                    len,
                    "file truncated, reading from start"
                );
                entry.offset = 0;
                drained = drain(entry, &self.parser, &self.transport, &self.stats)?;
            }
        }

        if drained.records > 0 {
            tracing::debug!(
                path = %entry.path.display(),
                records = drained.records,
                offset = entry.offset,
                "processed lines"
            );
        }
        Ok(drained.records)
    }

    /// Drain the old handle and schedule the path for registration once
    /// the backoff has passed, in the hope that rotation recreated it.
    fn recover(&mut self, idx: usize) {
        if let Err(err) = self.process(idx) {
            tracing::debug!(error = %err, "could not drain removed file");
        }

        let entry = &mut self.files[idx];
        self.source.unwatch(&entry.path);
        entry.file = None;
        entry.retry_at = Some(Instant::now() + self.config.backoff);
        tracing::info!(
            path = %entry.path.display(),
            backoff_ms = self.config.backoff.as_millis() as u64,
            "file removed, retrying after backoff"
        );
    }

    fn next_retry(&self) -> Option<Instant> {
        self.files.iter().filter_map(|f| f.retry_at).min()
    }

    /// Register every removed path whose backoff has elapsed
    fn retry_due(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        for idx in 0..self.files.len() {
            if self.files[idx].retry_at.is_some_and(|at| at <= now) {
                self.files[idx].retry_at = None;
                self.register(idx);
            }
        }
    }
}

/// Read complete lines from `entry.offset` to end-of-file. A trailing line
/// without its newline stays unread.
fn drain<P, T>(
    entry: &mut TailedFile,
    parser: &P,
    transport: &T,
    stats: &MonitorStats,
) -> Result<Drained, TailError>
where
    P: LogParser,
    T: Transport,
{
    let Some(file) = entry.file.as_mut() else {
        return Ok(Drained::default());
    };
    let path = &entry.path;

    file.seek(SeekFrom::Start(entry.offset))
        .map_err(|e| TailError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut drained = Drained::default();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| TailError::io(path, e))?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        entry.offset += n as u64;
        drained.bytes += n as u64;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        match parser.parse(line) {
            Some(record) => {
                transport.send(record);
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                drained.records += 1;
            }
            None => {
                stats.unmatched.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(path = %path.display(), "unmatched line");
            }
        }
    }

    Ok(drained)
}
