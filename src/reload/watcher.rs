// ! File system watcher for plugin hot reload
// !
// ! Module watches a configuration directory and emits one debounced event per
// ! path once that path has been quiet for the debounce window. A single
// ! coordinator task owns all pending deadlines; there is no timer per path.

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::HotReloadSettings;
use crate::core::error::{PluginError, PluginResult};

/// Capacity of the channel between the OS watcher and the coordinator
const RAW_EVENT_BUFFER: usize = 1024;

/// Kind of file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// Debounced change to one configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a path's latest change is emitted
    pub debounce: Duration,

    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,

    /// Watch subdirectories
    pub recursive: bool,

    /// Capacity of the outbound event channel
    pub event_buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            extensions: vec!["yaml".to_string(), "yml".to_string(), "json".to_string()],
            recursive: true,
            event_buffer: 100,
        }
    }
}

impl From<&HotReloadSettings> for WatcherConfig {
    fn from(settings: &HotReloadSettings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.debounce_ms),
            extensions: settings.extensions.clone(),
            ..Default::default()
        }
    }
}

impl WatcherConfig {
    /// Whether changes to `path` should be reported
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        // Hidden files and editor scratch files
        if file_name.starts_with('.')
            || file_name.ends_with('~')
            || file_name.ends_with(".swp")
            || file_name.ends_with(".tmp")
        {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Map a raw notify event to per-path changes
pub(crate) fn classify(event: &Event) -> Vec<FileChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => FileChangeKind::Renamed,
        EventKind::Modify(_) => FileChangeKind::Modified,
        EventKind::Remove(_) => FileChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|path| FileChangeEvent::new(path.clone(), kind))
        .collect()
}

struct Pending {
    generation: u64,
    deadline: Instant,
    event: FileChangeEvent,
}

/// Per-path debounce table with a min-heap of deadlines
///
/// Re-arming a path bumps its generation; heap entries whose generation no
/// longer matches are discarded when they surface.
#[derive(Default)]
pub(crate) struct Debouncer {
    pending: HashMap<PathBuf, Pending>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, PathBuf)>>,
    next_generation: u64,
}

impl Debouncer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a change, (re)arming its path's deadline
    pub(crate) fn push(&mut self, event: FileChangeEvent, now: Instant, window: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = now + window;

        self.deadlines
            .push(Reverse((deadline, generation, event.path.clone())));
        self.pending.insert(
            event.path.clone(),
            Pending {
                generation,
                deadline,
                event,
            },
        );

        if self.deadlines.len() > 2 * self.pending.len() + 64 {
            self.compact();
        }
    }

    /// Earliest armed deadline, if any
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Remove and return every change whose deadline has passed
    pub(crate) fn drain_due(&mut self, now: Instant) -> Vec<FileChangeEvent> {
        let mut due = Vec::new();
        while let Some(Reverse((at, _, _))) = self.deadlines.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, generation, path))) = self.deadlines.pop() else {
                break;
            };
            let current = self
                .pending
                .get(&path)
                .is_some_and(|p| p.generation == generation);
            if current {
                if let Some(pending) = self.pending.remove(&path) {
                    due.push(pending.event);
                }
            }
        }
        due
    }

    /// Paths waiting for their quiet period
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn compact(&mut self) {
        self.deadlines = self
            .pending
            .iter()
            .map(|(path, p)| Reverse((p.deadline, p.generation, path.clone())))
            .collect();
    }
}

struct WatchSession {
    // Dropping the watcher closes the OS handle
    watcher: RecommendedWatcher,
    token: CancellationToken,
    task: JoinHandle<()>,
    root: PathBuf,
}

/// Debounced watcher over a plugin configuration directory
pub struct HotReloadWatcher {
    config: WatcherConfig,
    debounce_ms: Arc<AtomicU64>,
    session: Mutex<Option<WatchSession>>,
}

impl HotReloadWatcher {
    /// Create a stopped watcher
    pub fn new(config: WatcherConfig) -> Self {
        let debounce_ms = Arc::new(AtomicU64::new(config.debounce.as_millis() as u64));
        Self {
            config,
            debounce_ms,
            session: Mutex::new(None),
        }
    }

    /// Change the debounce window; applies to changes observed from now on
    pub fn set_debounce(&self, debounce: Duration) {
        self.debounce_ms
            .store(debounce.as_millis() as u64, Ordering::Relaxed);
    }

    /// Current debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.load(Ordering::Relaxed))
    }

    /// Start watching `dir`, returning the debounced event stream
    ///
    /// Cancelling `token` (or calling `stop`) ends the stream; changes still
    /// inside their debounce window are discarded.
    pub async fn start(
        &self,
        dir: impl AsRef<Path>,
        token: CancellationToken,
    ) -> PluginResult<mpsc::Receiver<FileChangeEvent>> {
        let dir = dir.as_ref().to_path_buf();
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return Err(PluginError::AlreadyExists(format!(
                "watcher already running on {}",
                session.as_ref().map(|s| s.root.display().to_string()).unwrap_or_default()
            )));
        }
        if !tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(PluginError::Watch(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let (raw_tx, raw_rx) = mpsc::channel(RAW_EVENT_BUFFER);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                // Runs on the notify thread, outside the runtime
                let _ = raw_tx.blocking_send(result);
            },
            Config::default(),
        )?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&dir, mode)?;

        let (out_tx, out_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let token = token.child_token();
        let task = tokio::spawn(run_coordinator(
            raw_rx,
            out_tx,
            token.clone(),
            Arc::clone(&self.debounce_ms),
            self.config.clone(),
        ));

        info!("Watching {:?} for plugin config changes", dir);
        *session = Some(WatchSession {
            watcher,
            token,
            task,
            root: dir,
        });
        Ok(out_rx)
    }

    /// Stop watching and wait for the coordinator to exit
    pub async fn stop(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.token.cancel();
            drop(session.watcher);
            if let Err(e) = session.task.await {
                if !e.is_cancelled() {
                    warn!("Watcher coordinator ended abnormally: {}", e);
                }
            }
            info!("Stopped watching {:?}", session.root);
        }
    }

    /// Whether the coordinator is running
    pub async fn is_watching(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }
}

impl Drop for HotReloadWatcher {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.token.cancel();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_coordinator(
    mut raw: mpsc::Receiver<notify::Result<Event>>,
    out: mpsc::Sender<FileChangeEvent>,
    token: CancellationToken,
    debounce_ms: Arc<AtomicU64>,
    config: WatcherConfig,
) {
    let mut debouncer = Debouncer::new();

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            _ = token.cancelled() => break,
            received = raw.recv() => match received {
                Some(Ok(event)) => {
                    let window = Duration::from_millis(debounce_ms.load(Ordering::Relaxed));
                    let now = Instant::now();
                    for change in classify(&event) {
                        if config.accepts(&change.path) {
                            debouncer.push(change, now, window);
                        }
                    }
                }
                Some(Err(e)) => warn!("File watch error: {}", e),
                None => break,
            },
            _ = wait_until(deadline) => {
                for event in debouncer.drain_due(Instant::now()) {
                    match out.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(event)) => {
                            warn!("Reload event channel full, dropping change to {:?}", event.path);
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("Reload event receiver closed");
                        }
                    }
                }
            }
        }
    }

    if debouncer.pending_len() > 0 {
        debug!("Discarding {} pending change(s)", debouncer.pending_len());
    }
}
