//! WASM Guest Runtime Module
//!
//! Sandboxed execution of a single WebAssembly guest:
//! - Compile and instantiate one module at a time
//! - Typed access to exported functions and globals by name
//! - Bounds-checked copies in and out of linear memory
//! - Host functions the guest may import
//! - Resource limits on memory and tables
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    WasmRuntime                        │
//! │  ┌──────────┐  ┌────────────┐  ┌──────────────────┐   │
//! │  │  Engine  │  │   Module   │  │ Store + Exports  │   │
//! │  └──────────┘  └────────────┘  └──────────────────┘   │
//! │                       │                               │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │ HostFunctionMap (bound at instantiation)        │  │
//! │  │  _get_samplerate  _get_time_position  ...       │  │
//! │  └─────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │ Guest instance: memory, globals, functions      │  │
//! │  └─────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```

pub mod host;
mod memory;
pub mod runtime;
mod types;

pub use host::{HostCallback, HostCaller, HostFunctionDescriptor, HostFunctionMap};
pub use memory::{
    GuestPtr, MIDI_EVENT_HEADER_SIZE, audio_block_size, decode_midi_event, encode_midi_events,
    midi_block_size,
};
pub use runtime::{
    GuestAccess, HostState, MAX_CALL_VALUES, MEMORY_EXPORT, OptimizationLevel, RuntimeConfig,
    RuntimeStats, StoreLimits, WasmRuntime,
};
pub use types::{
    ModuleSource, ResourceLimits, WasmError, WasmPrimitive, WasmResult, WasmType, WasmValue,
};
