//! Hot-reload manager
//!
//! Feeds watch events into [`WasmHostPlugin::load_wasm_binary`] and keeps a
//! record of what happened.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::watcher::{BinaryWatcher, WatchEvent, WatchEventKind};
use crate::wasm_host::WasmHostPlugin;
use crate::wasm_runtime::WasmError;

/// Reload lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReloadEvent {
    /// Hot-reload started
    ReloadStarted { path: PathBuf },
    /// Hot-reload completed
    ReloadCompleted { path: PathBuf, duration: Duration },
    /// Hot-reload failed, the plugin is left without an instance
    ReloadFailed { path: PathBuf, error: String },
    /// Binary removed, the running instance is kept
    BinaryRemoved { path: PathBuf },
}

/// Reload error types
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load error: {0}")]
    Wasm(#[from] WasmError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Watch event receiver already taken")]
    ReceiverTaken,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ReloadResult<T> = Result<T, ReloadError>;

/// Reload counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStats {
    pub reloads: u64,
    pub failures: u64,
}

/// Hot-reload manager for one plugin
pub struct ReloadManager {
    /// Plugin whose guest gets replaced
    plugin: Arc<WasmHostPlugin>,
    /// Event broadcaster
    event_tx: broadcast::Sender<ReloadEvent>,
    /// Every event emitted so far
    history: Mutex<Vec<ReloadEvent>>,
    reloads: AtomicU64,
    failures: AtomicU64,
}

impl ReloadManager {
    pub fn new(plugin: Arc<WasmHostPlugin>) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        Self {
            plugin,
            event_tx,
            history: Mutex::new(Vec::new()),
            reloads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn plugin(&self) -> &Arc<WasmHostPlugin> {
        &self.plugin
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    /// Successful reloads so far
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            reloads: self.reloads.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn history(&self) -> Vec<ReloadEvent> {
        self.history.lock().clone()
    }

    fn record(&self, event: ReloadEvent) {
        debug!("Reload event: {:?}", event);
        self.history.lock().push(event.clone());
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Read `path` and swap it in as the running guest
    pub async fn reload_from_path(&self, path: &Path) -> ReloadResult<Duration> {
        self.record(ReloadEvent::ReloadStarted {
            path: path.to_path_buf(),
        });
        let start = Instant::now();

        match self.load(path).await {
            Ok(()) => {
                let duration = start.elapsed();
                self.reloads.fetch_add(1, Ordering::Relaxed);
                info!("Reloaded guest binary {:?} in {:?}", path, duration);
                self.record(ReloadEvent::ReloadCompleted {
                    path: path.to_path_buf(),
                    duration,
                });
                Ok(duration)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!("Failed to reload guest binary {:?}: {}", path, e);
                self.record(ReloadEvent::ReloadFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn load(&self, path: &Path) -> ReloadResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let plugin = Arc::clone(&self.plugin);
        // compilation is CPU bound
        tokio::task::spawn_blocking(move || plugin.load_wasm_binary(&bytes))
            .await
            .map_err(|e| ReloadError::Internal(e.to_string()))??;
        Ok(())
    }

    /// React to one watch event
    pub async fn handle_event(&self, event: &WatchEvent) {
        match event.kind {
            WatchEventKind::Created | WatchEventKind::Modified => {
                // failures are recorded and logged by reload_from_path
                let _ = self.reload_from_path(&event.path).await;
            }
            WatchEventKind::Removed => {
                warn!("Guest binary removed: {:?}", event.path);
                self.record(ReloadEvent::BinaryRemoved {
                    path: event.path.clone(),
                });
            }
        }
    }

    /// Process events until the sender side closes
    pub fn spawn(self: &Arc<Self>, mut events: mpsc::Receiver<WatchEvent>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                manager.handle_event(&event).await;
            }
            debug!("Watch event stream closed");
        })
    }

    /// Start `watcher` and process its events
    pub fn watch(self: &Arc<Self>, watcher: &mut BinaryWatcher) -> ReloadResult<JoinHandle<()>> {
        let events = watcher
            .take_event_receiver()
            .ok_or(ReloadError::ReceiverTaken)?;
        watcher.start()?;
        Ok(self.spawn(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm_runtime::RuntimeConfig;
    use hiphop_kernel::{MidiEvent, PluginHost, PluginInfo, TimePosition};
    use tempfile::TempDir;

    struct NullHost;

    impl PluginHost for NullHost {
        fn sample_rate(&self) -> f64 {
            48000.0
        }

        fn time_position(&self) -> TimePosition {
            TimePosition::default()
        }

        fn write_midi_event(&self, _event: &MidiEvent<'_>) -> bool {
            false
        }
    }

    const MINIMAL_GUEST: &str = r#"
        (module
            (memory (export "memory") 1)
            (global (export "_rw_num_inputs") (mut i32) (i32.const 0))
            (global (export "_rw_num_outputs") (mut i32) (i32.const 0))
            (global (export "_rw_input_block") i32 (i32.const 1024))
            (global (export "_rw_output_block") i32 (i32.const 2048))
            (global (export "_rw_midi_block") i32 (i32.const 4096))
            (func (export "_run") (param i32 i32))
        )
    "#;

    fn manager() -> Arc<ReloadManager> {
        let info = PluginInfo {
            parameter_count: 0,
            ..Default::default()
        };
        let plugin =
            WasmHostPlugin::new(info, RuntimeConfig::default(), Arc::new(NullHost)).unwrap();
        Arc::new(ReloadManager::new(Arc::new(plugin)))
    }

    #[tokio::test]
    async fn test_reload_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimized.wasm");
        std::fs::write(&path, MINIMAL_GUEST).unwrap();

        let manager = manager();
        let mut events = manager.subscribe();
        manager.reload_from_path(&path).await.unwrap();

        assert!(manager.plugin().has_instance());
        assert_eq!(manager.reload_count(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            ReloadEvent::ReloadStarted { path: path.clone() }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            ReloadEvent::ReloadCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_reload_is_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimized.wasm");
        std::fs::write(&path, MINIMAL_GUEST).unwrap();

        let manager = manager();
        manager.reload_from_path(&path).await.unwrap();

        std::fs::write(&path, b"\0asm garbage").unwrap();
        assert!(matches!(
            manager.reload_from_path(&path).await,
            Err(ReloadError::Wasm(WasmError::CompileError(_)))
        ));
        assert!(!manager.plugin().has_instance());
        assert_eq!(
            manager.stats(),
            ReloadStats {
                reloads: 1,
                failures: 1
            }
        );
        assert!(matches!(
            manager.history().last(),
            Some(ReloadEvent::ReloadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let manager = manager();
        let result = manager
            .reload_from_path(Path::new("/nonexistent/optimized.wasm"))
            .await;
        assert!(matches!(result, Err(ReloadError::Io(_))));
        assert_eq!(manager.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_removed_binary_keeps_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimized.wasm");
        std::fs::write(&path, MINIMAL_GUEST).unwrap();

        let manager = manager();
        manager
            .handle_event(&WatchEvent::new(WatchEventKind::Created, path.clone()))
            .await;
        assert!(manager.plugin().has_instance());

        manager
            .handle_event(&WatchEvent::new(WatchEventKind::Removed, path.clone()))
            .await;
        assert!(manager.plugin().has_instance());
        assert_eq!(
            manager.history().last(),
            Some(&ReloadEvent::BinaryRemoved { path })
        );
    }

    #[tokio::test]
    async fn test_spawned_processor_drains_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimized.wasm");
        std::fs::write(&path, MINIMAL_GUEST).unwrap();

        let manager = manager();
        let (tx, rx) = mpsc::channel(4);
        let handle = manager.spawn(rx);

        tx.send(WatchEvent::new(WatchEventKind::Modified, path))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(manager.reload_count(), 1);
    }
}
