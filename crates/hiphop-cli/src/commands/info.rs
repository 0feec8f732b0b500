//! `hiphop info` command implementation
//!
//! Loads the guest and prints what it reports through the plugin interface.

use std::sync::Arc;

use colored::Colorize;
use hiphop_kernel::{AudioPlugin, Parameter, StateDescriptor, hints};
use serde::Serialize;

use crate::context::CliContext;
use crate::host::OfflineHost;
use crate::output::{OutputFormat, format_unique_id, format_version, print_json};

#[derive(Debug, Serialize)]
pub struct PluginReport {
    pub binary: String,
    pub label: String,
    pub maker: String,
    pub license: String,
    pub version: String,
    pub unique_id: i64,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub parameters: Vec<ParameterReport>,
    pub programs: Vec<String>,
    pub states: Vec<StateDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct ParameterReport {
    pub index: u32,
    #[serde(flatten)]
    pub parameter: Parameter,
    pub value: f32,
}

/// Collect everything the guest reports
pub fn report(ctx: &CliContext, plugin: &dyn AudioPlugin) -> PluginReport {
    let info = &ctx.config.plugin;
    PluginReport {
        binary: ctx.binary.display().to_string(),
        label: plugin.label(),
        maker: plugin.maker(),
        license: plugin.license(),
        version: format_version(plugin.version()),
        unique_id: plugin.unique_id(),
        num_inputs: info.num_inputs,
        num_outputs: info.num_outputs,
        parameters: (0..info.parameter_count)
            .map(|index| ParameterReport {
                index,
                parameter: plugin.init_parameter(index),
                value: plugin.parameter_value(index),
            })
            .collect(),
        programs: (0..info.program_count)
            .map(|index| plugin.init_program_name(index))
            .collect(),
        states: (0..info.state_count)
            .map(|index| plugin.init_state(index))
            .collect(),
    }
}

/// Execute the `hiphop info` command
pub fn run(ctx: &CliContext, format: OutputFormat) -> anyhow::Result<()> {
    let host = Arc::new(OfflineHost::new(48000.0));
    let plugin = ctx.load_plugin(host)?;
    let report = report(ctx, &plugin);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &PluginReport) {
    println!();
    println!("  {} {}", report.label.bold(), report.version.yellow());
    println!("  Maker:     {}", report.maker);
    println!("  License:   {}", report.license);
    println!("  Unique ID: {}", format_unique_id(report.unique_id));
    println!(
        "  Channels:  {} in / {} out",
        report.num_inputs, report.num_outputs
    );
    println!("  Binary:    {}", report.binary.cyan());

    if !report.parameters.is_empty() {
        println!();
        println!("  {}", "Parameters".bold());
        for p in &report.parameters {
            let ranges = &p.parameter.ranges;
            println!(
                "    {:>3}  {:<20} {:>10.4}  [{} .. {}] default {}{}",
                p.index,
                p.parameter.name,
                p.value,
                ranges.min,
                ranges.max,
                ranges.def,
                hint_labels(p.parameter.hints)
            );
        }
    }

    if !report.programs.is_empty() {
        println!();
        println!("  {}", "Programs".bold());
        for (index, name) in report.programs.iter().enumerate() {
            println!("    {:>3}  {}", index, name);
        }
    }

    if !report.states.is_empty() {
        println!();
        println!("  {}", "States".bold());
        for state in &report.states {
            println!("    {} = {:?}", state.key, state.default_value);
        }
    }
    println!();
}

fn hint_labels(flags: u32) -> String {
    const LABELS: [(u32, &str); 5] = [
        (hints::AUTOMATABLE, "automatable"),
        (hints::BOOLEAN, "boolean"),
        (hints::INTEGER, "integer"),
        (hints::LOGARITHMIC, "logarithmic"),
        (hints::OUTPUT, "output"),
    ];
    let labels: Vec<&str> = LABELS
        .iter()
        .filter(|(bit, _)| flags & bit == *bit)
        .map(|(_, label)| *label)
        .collect();
    if labels.is_empty() {
        String::new()
    } else {
        format!("  ({})", labels.join(", "))
    }
}
