//! Offline stand-in for the plugin host SDK

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hiphop_kernel::{MidiEvent, PluginHost, TimePosition};
use tracing::debug;

/// Host with a free-running transport and a counting MIDI sink
pub struct OfflineHost {
    sample_rate: f64,
    playing: AtomicBool,
    frame: AtomicU64,
    midi_out: AtomicU64,
}

impl OfflineHost {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            playing: AtomicBool::new(false),
            frame: AtomicU64::new(0),
            midi_out: AtomicU64::new(0),
        }
    }

    pub fn start(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    /// Move the transport forward after a processed block
    pub fn advance(&self, frames: usize) {
        if self.playing.load(Ordering::Relaxed) {
            self.frame.fetch_add(frames as u64, Ordering::Relaxed);
        }
    }

    /// MIDI events the guest has written so far
    pub fn midi_out(&self) -> u64 {
        self.midi_out.load(Ordering::Relaxed)
    }
}

impl PluginHost for OfflineHost {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn time_position(&self) -> TimePosition {
        TimePosition {
            playing: self.playing.load(Ordering::Relaxed),
            frame: self.frame.load(Ordering::Relaxed),
        }
    }

    fn write_midi_event(&self, event: &MidiEvent<'_>) -> bool {
        debug!("MIDI out at frame {}: {:02x?}", event.frame, event.data);
        self.midi_out.fetch_add(1, Ordering::Relaxed);
        true
    }
}
