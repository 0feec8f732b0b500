//! Hip-Hop plugins
//!
//! Runs a WebAssembly DSP guest behind the [`AudioPlugin`] interface:
//! - `wasm_runtime`: engine wrapper, value model, host import table
//! - `wasm_host`: the plugin adapter speaking the guest calling convention
//! - `hot_reload`: watching the guest binary and swapping it in at runtime

pub mod hot_reload;
pub mod wasm_host;
pub mod wasm_runtime;

pub use hiphop_kernel::{AudioPlugin, PluginHost, PluginInfo};
pub use wasm_host::WasmHostPlugin;
pub use wasm_runtime::{WasmError, WasmResult, WasmRuntime};
