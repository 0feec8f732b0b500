//! Hip-Hop kernel
//!
//! Boundary types shared between the plugin host SDK and the WebAssembly DSP
//! adapter: the plugin/host traits, parameter and MIDI types, and the host
//! configuration model.

// plugin module
pub mod plugin;
pub use plugin::*;

// config module
pub mod config;
