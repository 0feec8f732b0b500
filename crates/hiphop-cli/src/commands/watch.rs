//! `hiphop watch` command implementation

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use hiphop_kernel::AudioPlugin;
use hiphop_plugins::hot_reload::{BinaryWatcher, ReloadEvent, ReloadManager, WatchConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::context::CliContext;
use crate::host::OfflineHost;
use crate::output::{OutputFormat, print_json};

/// Execute the `hiphop watch` command, runs until Ctrl-C
pub async fn run(
    ctx: &CliContext,
    debounce_ms: Option<u64>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let host = Arc::new(OfflineHost::new(48000.0));
    let plugin = Arc::new(ctx.load_plugin(host)?);
    plugin.activate();

    let mut config = WatchConfig::from(&ctx.config.reload);
    if let Some(ms) = debounce_ms {
        config = config.with_debounce(Duration::from_millis(ms));
    }

    let manager = Arc::new(ReloadManager::new(plugin.clone()));
    let mut events = manager.subscribe();
    let mut watcher = BinaryWatcher::new(&ctx.binary, config);
    let processor = manager.watch(&mut watcher)?;

    if format == OutputFormat::Text {
        println!(
            "Watching {} ({}), press Ctrl-C to stop",
            ctx.binary.display().to_string().cyan(),
            plugin.label()
        );
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, &*plugin, format)?,
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} reload events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.stop().await;
    processor.abort();
    plugin.deactivate();

    let stats = manager.stats();
    if format == OutputFormat::Text {
        println!(
            "Stopped after {} reloads, {} failures",
            stats.reloads, stats.failures
        );
    }
    Ok(())
}

fn print_event(
    event: &ReloadEvent,
    plugin: &dyn AudioPlugin,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(event);
    }

    match event {
        ReloadEvent::ReloadStarted { path } => {
            println!("{} {}", "reloading".yellow(), path.display());
        }
        ReloadEvent::ReloadCompleted { duration, .. } => {
            println!(
                "{} {} in {:.1} ms",
                "reloaded".green(),
                plugin.label(),
                duration.as_secs_f64() * 1000.0
            );
        }
        ReloadEvent::ReloadFailed { error, .. } => {
            println!("{} {}", "failed".red(), error);
        }
        ReloadEvent::BinaryRemoved { path } => {
            println!(
                "{} {}, keeping the running guest",
                "removed".red(),
                path.display()
            );
        }
    }
    Ok(())
}
