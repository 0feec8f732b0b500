//! Hot-reload support for the guest binary
//!
//! - File watching for the binary on disk
//! - Debounced change notifications
//! - Reload through the plugin adapter under its engine lock
//! - Reload history and counters

mod manager;
mod watcher;

pub use manager::{ReloadError, ReloadEvent, ReloadManager, ReloadResult, ReloadStats};
pub use watcher::{BinaryWatcher, WatchConfig, WatchEvent, WatchEventKind};
