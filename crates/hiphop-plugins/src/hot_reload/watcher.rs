//! File system watcher for the guest binary
//!
//! Watches the directory holding the binary and reports changes to that one
//! file once writes have settled for the debounce duration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hiphop_kernel::config::ReloadSettings;

/// Watch event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Binary appeared (including being renamed into place)
    Created,
    /// Binary contents changed
    Modified,
    /// Binary removed
    Removed,
}

/// Watch event
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Event kind
    pub kind: WatchEventKind,
    /// Affected path
    pub path: PathBuf,
    /// Timestamp
    pub timestamp: std::time::Instant,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            timestamp: std::time::Instant::now(),
        }
    }

    /// Whether the binary is there to be loaded
    pub fn is_loadable(&self) -> bool {
        !matches!(self.kind, WatchEventKind::Removed)
    }
}

/// Watch configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period after the last change before an event is emitted
    pub debounce_duration: Duration,
    /// Poll interval for platforms without native notifications
    pub poll_interval: Duration,
    /// Capacity of the event channel
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(250),
            poll_interval: Duration::from_millis(100),
            channel_capacity: 64,
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_duration = duration;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl From<&ReloadSettings> for WatchConfig {
    fn from(settings: &ReloadSettings) -> Self {
        Self::default().with_debounce(Duration::from_millis(settings.debounce_ms))
    }
}

/// Map a notify event kind onto ours, `None` for events that do not change
/// the file contents
fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEventKind::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Remove(_) => Some(WatchEventKind::Removed),
        _ => None,
    }
}

/// Watcher for a single guest binary
pub struct BinaryWatcher {
    /// Watched file
    path: PathBuf,
    /// Configuration
    config: WatchConfig,
    /// Event sender
    event_tx: mpsc::Sender<WatchEvent>,
    /// Event receiver (taken by consumer)
    event_rx: Option<mpsc::Receiver<WatchEvent>>,
    /// Internal watcher handle
    watcher: Option<RecommendedWatcher>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl BinaryWatcher {
    pub fn new<P: AsRef<Path>>(path: P, config: WatchConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);

        Self {
            path: path.as_ref().to_path_buf(),
            config,
            event_tx,
            event_rx: Some(event_rx),
            watcher: None,
            shutdown_tx: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<WatchEvent>> {
        self.event_rx.take()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start watching. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), notify::Error> {
        let Some(file_name) = self.path.file_name().map(|n| n.to_os_string()) else {
            return Err(notify::Error::generic("guest binary path has no file name"));
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            warn!("Watch directory does not exist: {:?}", dir);
            return Err(notify::Error::path_not_found().add_path(dir));
        }

        info!("Watching guest binary {:?}", self.path);

        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let watcher_config = Config::default().with_poll_interval(self.config.poll_interval);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    let _ = tx.blocking_send(event);
                }
            },
            watcher_config,
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let event_tx = self.event_tx.clone();
        let path = self.path.clone();
        let debounce = self.config.debounce_duration;

        tokio::spawn(async move {
            let mut pending: Option<WatchEventKind> = None;
            let mut deadline = Instant::now();

            loop {
                tokio::select! {
                    Some(event) = rx.recv() => {
                        let touches_binary = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()));
                        if !touches_binary {
                            continue;
                        }
                        if let Some(kind) = classify(&event.kind) {
                            debug!("Raw event {:?} for {:?}", event.kind, path);
                            pending = Some(match (pending, kind) {
                                (Some(WatchEventKind::Removed), WatchEventKind::Created) => {
                                    WatchEventKind::Modified
                                }
                                _ => kind,
                            });
                            deadline = Instant::now() + debounce;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                        if let Some(kind) = pending.take() {
                            let evt = WatchEvent::new(kind, path.clone());
                            debug!("Watch event: {:?}", evt);
                            if event_tx.send(evt).await.is_err() {
                                debug!("Watch event receiver dropped");
                                return;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Binary watcher shutting down");
                        return;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop watching
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.watcher = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn test_watch_config() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_duration, Duration::from_millis(250));

        let settings = ReloadSettings {
            watch: true,
            debounce_ms: 40,
        };
        assert_eq!(
            WatchConfig::from(&settings).debounce_duration,
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(WatchEventKind::Created)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(WatchEventKind::Modified)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(WatchEventKind::Created)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File)),
            Some(WatchEventKind::Removed)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn test_watch_event() {
        let event = WatchEvent::new(WatchEventKind::Removed, PathBuf::from("dsp/optimized.wasm"));
        assert!(!event.is_loadable());
        assert!(WatchEvent::new(WatchEventKind::Modified, PathBuf::new()).is_loadable());
    }

    #[tokio::test]
    async fn test_take_receiver_once() {
        let mut watcher = BinaryWatcher::new("dsp/optimized.wasm", WatchConfig::default());
        assert!(watcher.take_event_receiver().is_some());
        assert!(watcher.take_event_receiver().is_none());
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_start_missing_directory_fails() {
        let mut watcher = BinaryWatcher::new(
            "/nonexistent/hiphop/dsp/optimized.wasm",
            WatchConfig::default(),
        );
        assert!(watcher.start().is_err());
        assert!(!watcher.is_running());
    }
}
