//! File watcher driving reloads end to end

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use hiphop_kernel::AudioPlugin;
use hiphop_plugins::hot_reload::{
    BinaryWatcher, ReloadEvent, ReloadManager, WatchConfig,
};
use tempfile::TempDir;
use tokio::time::timeout;

async fn next_completion(
    events: &mut tokio::sync::broadcast::Receiver<ReloadEvent>,
) -> ReloadEvent {
    loop {
        let event = timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no reload event within timeout")
            .unwrap();
        if !matches!(event, ReloadEvent::ReloadStarted { .. }) {
            return event;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rewriting_binary_triggers_reload() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hiphop_plugins=debug")
        .with_test_writer()
        .try_init();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("optimized.wasm");
    std::fs::write(&path, gain_guest(1.0)).unwrap();

    let plugin = Arc::new(plugin_with_host(TestHost::new()));
    plugin.load_wasm_file(&path).unwrap();
    plugin.activate();

    let manager = Arc::new(ReloadManager::new(Arc::clone(&plugin)));
    let mut events = manager.subscribe();
    let mut watcher = BinaryWatcher::new(
        &path,
        WatchConfig::new().with_debounce(Duration::from_millis(50)),
    );
    let _task = manager.watch(&mut watcher).unwrap();
    assert!(watcher.is_running());

    // give the backend a moment to register the directory
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&path, gain_guest(0.5)).unwrap();

    let event = next_completion(&mut events).await;
    assert!(
        matches!(event, ReloadEvent::ReloadCompleted { .. }),
        "unexpected {event:?}"
    );
    assert!(manager.reload_count() >= 1);

    let (left, right) = test_signal(FRAMES);
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    let expected: Vec<f32> = left.iter().map(|s| s * 0.5).collect();
    assert_eq!(out_l, expected);
    assert!(plugin.is_active());

    watcher.stop().await;
}
