//! `hiphop render` command implementation
//!
//! Drives the guest block by block with a sine test tone and reports the
//! level of every output channel.

use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use hiphop_kernel::AudioPlugin;
use serde::Serialize;
use tracing::debug;

use crate::context::CliContext;
use crate::error::CliError;
use crate::host::OfflineHost;
use crate::output::{OutputFormat, print_json};

/// Render settings taken from the command line
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub frames: usize,
    pub block_size: usize,
    pub sample_rate: f64,
    pub tone: f32,
    pub assignments: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelLevel {
    pub peak: f32,
    pub rms: f32,
}

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub frames: usize,
    pub blocks: usize,
    pub midi_out: u64,
    pub elapsed_ms: f64,
    /// Rendered audio time divided by wall time
    pub realtime_factor: f64,
    pub channels: Vec<ChannelLevel>,
}

/// Render report plus the adapter's count of blocks replaced by silence
#[derive(Debug, Serialize)]
pub struct RenderSummary {
    #[serde(flatten)]
    pub report: RenderReport,
    pub dropped_blocks: u64,
}

/// Accumulates peak and sum of squares for one channel
#[derive(Debug, Default, Clone, Copy)]
struct Meter {
    peak: f32,
    sum_sq: f64,
    count: usize,
}

impl Meter {
    fn feed(&mut self, samples: &[f32]) {
        for &s in samples {
            self.peak = self.peak.max(s.abs());
            self.sum_sq += f64::from(s) * f64::from(s);
        }
        self.count += samples.len();
    }

    fn level(&self) -> ChannelLevel {
        let rms = if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt() as f32
        };
        ChannelLevel {
            peak: self.peak,
            rms,
        }
    }
}

/// Process `options.frames` frames through `plugin`
pub fn render(
    plugin: &dyn AudioPlugin,
    host: &OfflineHost,
    num_inputs: usize,
    num_outputs: usize,
    options: &RenderOptions,
) -> Result<RenderReport, CliError> {
    if options.block_size == 0 {
        return Err(CliError::Other("block size must be at least 1".to_string()));
    }

    for &(index, value) in &options.assignments {
        debug!("Setting parameter {} to {}", index, value);
        plugin.set_parameter_value(index, value);
    }

    let mut inputs = vec![vec![0.0f32; options.block_size]; num_inputs];
    let mut outputs = vec![vec![0.0f32; options.block_size]; num_outputs];
    let mut meters = vec![Meter::default(); num_outputs];
    let phase_step = options.tone / options.sample_rate as f32 * std::f32::consts::TAU;

    plugin.activate();
    host.start();

    let start = Instant::now();
    let mut rendered = 0;
    let mut blocks = 0;
    while rendered < options.frames {
        let frames = options.block_size.min(options.frames - rendered);
        for channel in inputs.iter_mut() {
            for (i, sample) in channel[..frames].iter_mut().enumerate() {
                *sample = ((rendered + i) as f32 * phase_step).sin() * 0.5;
            }
        }

        {
            let input_refs: Vec<&[f32]> = inputs.iter().map(|c| &c[..frames]).collect();
            let mut output_refs: Vec<&mut [f32]> =
                outputs.iter_mut().map(|c| &mut c[..frames]).collect();
            plugin.run(&input_refs, &mut output_refs, frames, &[]);
        }

        for (meter, channel) in meters.iter_mut().zip(&outputs) {
            meter.feed(&channel[..frames]);
        }
        host.advance(frames);
        rendered += frames;
        blocks += 1;
    }
    let elapsed = start.elapsed().as_secs_f64();

    plugin.deactivate();

    let audio_seconds = rendered as f64 / options.sample_rate;
    Ok(RenderReport {
        frames: rendered,
        blocks,
        midi_out: host.midi_out(),
        elapsed_ms: elapsed * 1000.0,
        realtime_factor: if elapsed > 0.0 {
            audio_seconds / elapsed
        } else {
            f64::INFINITY
        },
        channels: meters.iter().map(Meter::level).collect(),
    })
}

/// Execute the `hiphop render` command
pub fn run(ctx: &CliContext, options: &RenderOptions, format: OutputFormat) -> anyhow::Result<()> {
    let host = Arc::new(OfflineHost::new(options.sample_rate));
    let plugin = ctx.load_plugin(host.clone())?;
    let info = ctx.config.plugin;

    let report = render(
        &plugin,
        &host,
        info.num_inputs as usize,
        info.num_outputs as usize,
        options,
    )?;
    let summary = RenderSummary {
        report,
        dropped_blocks: plugin.dropped_blocks(),
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => print_text(&summary),
    }
    Ok(())
}

fn print_text(summary: &RenderSummary) {
    let report = &summary.report;
    println!(
        "Rendered {} frames in {} blocks ({:.1} ms, {:.0}x realtime)",
        report.frames, report.blocks, report.elapsed_ms, report.realtime_factor
    );
    for (index, level) in report.channels.iter().enumerate() {
        println!(
            "  out {}: peak {:.4}  rms {:.4}",
            index, level.peak, level.rms
        );
    }
    if report.midi_out > 0 {
        println!("  MIDI events out: {}", report.midi_out);
    }
    if summary.dropped_blocks > 0 {
        println!(
            "  {}",
            format!("{} blocks dropped", summary.dropped_blocks).red()
        );
    }
}
