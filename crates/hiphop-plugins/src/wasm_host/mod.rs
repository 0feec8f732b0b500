//! WASM host plugin
//!
//! [`WasmHostPlugin`] implements [`AudioPlugin`] by forwarding every call to
//! a guest binary running in a [`WasmRuntime`]. All guest access is
//! serialized by one spin lock, held for the full duration of each call and
//! across the whole reload sequence, so the audio thread observes either the
//! old instance or the new one, never a mix.

pub mod abi;
pub mod imports;
pub mod transfer;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, trace};

use hiphop_kernel::config::HostConfig;
use hiphop_kernel::{
    AudioPlugin, MidiEvent, Parameter, PluginHost, PluginInfo, StateDescriptor,
};

use crate::wasm_runtime::{
    GuestAccess, ModuleSource, RuntimeConfig, WasmError, WasmPrimitive, WasmResult, WasmRuntime,
    WasmValue,
};
use abi::globals;
use transfer::{ParameterRecord, StateRecord};

/// Returned by the string getters when the guest cannot answer
pub const ERROR_STR: &str = "Error";

struct GuestSlot {
    runtime: WasmRuntime,
    active: bool,
}

/// Audio plugin backed by a WebAssembly guest
pub struct WasmHostPlugin {
    info: PluginInfo,
    host: Arc<dyn PluginHost>,
    guest: spin::Mutex<GuestSlot>,
    stored_state: Mutex<HashMap<String, String>>,
    dropped_blocks: AtomicU64,
}

impl WasmHostPlugin {
    /// Create an adapter with no guest loaded
    pub fn new(
        info: PluginInfo,
        runtime_config: RuntimeConfig,
        host: Arc<dyn PluginHost>,
    ) -> WasmResult<Self> {
        Ok(Self {
            info,
            host,
            guest: spin::Mutex::new(GuestSlot {
                runtime: WasmRuntime::new(runtime_config)?,
                active: false,
            }),
            stored_state: Mutex::new(HashMap::new()),
            dropped_blocks: AtomicU64::new(0),
        })
    }

    /// Create an adapter and load the guest binary named by `config`,
    /// relative to `library_dir`.
    ///
    /// A binary that fails to load is logged and leaves the adapter without
    /// an instance; a later [`load_wasm_binary`](Self::load_wasm_binary)
    /// can still bring it up.
    pub fn from_config(
        config: &HostConfig,
        library_dir: &Path,
        host: Arc<dyn PluginHost>,
    ) -> WasmResult<Self> {
        let plugin = Self::new(config.plugin, RuntimeConfig::from_host_config(config), host)?;
        let path = config.resolve_binary_path(library_dir);
        if let Err(e) = plugin.load_wasm_file(&path) {
            error!("Failed to load guest binary {}: {}", path.display(), e);
        }
        Ok(plugin)
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn has_instance(&self) -> bool {
        self.guest.lock().runtime.has_instance()
    }

    pub fn is_active(&self) -> bool {
        self.guest.lock().active
    }

    /// Blocks replaced by silence because the guest failed to process them
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    /// State values received through [`AudioPlugin::set_state`]
    pub fn stored_state(&self) -> HashMap<String, String> {
        self.stored_state.lock().clone()
    }

    /// Replace the running guest with `bytes`.
    ///
    /// The lock is held across load, instantiation, parameter
    /// initialization and reactivation. On failure the adapter is left
    /// without an instance.
    pub fn load_wasm_binary(&self, bytes: &[u8]) -> WasmResult<()> {
        self.load_source(ModuleSource::Bytes(bytes))
    }

    /// Read and load a guest binary from disk
    pub fn load_wasm_file(&self, path: &Path) -> WasmResult<()> {
        self.load_source(ModuleSource::Path(path))
    }

    fn load_source(&self, source: ModuleSource<'_>) -> WasmResult<()> {
        let mut slot = self.guest.lock();
        match self.bring_up(&mut slot, source) {
            Ok(()) => {
                info!(
                    "Guest binary loaded ({} parameters, active: {})",
                    self.info.parameter_count, slot.active
                );
                Ok(())
            }
            Err(e) => {
                slot.runtime.unload();
                Err(e)
            }
        }
    }

    fn bring_up(&self, slot: &mut GuestSlot, source: ModuleSource<'_>) -> WasmResult<()> {
        let runtime = &mut slot.runtime;
        runtime.load(source)?;
        runtime.instantiate(&imports::host_functions(&self.host))?;

        for name in abi::REQUIRED_EXPORTS {
            if !runtime.has_export(name) {
                return Err(WasmError::UnknownExport(name.to_string()));
            }
        }
        runtime.set_global(globals::NUM_INPUTS, WasmValue::I32(self.info.num_inputs as i32))?;
        runtime.set_global(globals::NUM_OUTPUTS, WasmValue::I32(self.info.num_outputs as i32))?;

        // no effect on host parameters, the guest may rely on it to initialize
        for index in 0..self.info.parameter_count {
            runtime.call_function_into(abi::INIT_PARAMETER, &[WasmValue::I32(index as i32)], &mut [])?;
        }

        if slot.active {
            runtime.call_function_into(abi::ACTIVATE, &[], &mut [])?;
        }
        Ok(())
    }

    /// Run `f` against the live instance under the lock
    fn with_instance<T>(
        &self,
        op: &str,
        f: impl FnOnce(&mut GuestSlot) -> WasmResult<T>,
    ) -> WasmResult<T> {
        let mut slot = self.guest.lock();
        if !slot.runtime.has_instance() {
            return Err(WasmError::MissingInstance(op.to_string()));
        }
        f(&mut slot)
    }

    /// Like [`with_instance`](Self::with_instance), logging failures and
    /// falling back to `default`
    fn guarded<T>(
        &self,
        op: &str,
        default: T,
        f: impl FnOnce(&mut GuestSlot) -> WasmResult<T>,
    ) -> T {
        match self.with_instance(op, f) {
            Ok(value) => value,
            Err(e) => {
                error!("{}", describe(op, &e));
                default
            }
        }
    }

    fn guest_string(&self, export: &str) -> String {
        self.guarded(export, ERROR_STR.to_string(), |slot| {
            slot.runtime.call_function_cstring(export, &[])
        })
    }

    fn process(
        &self,
        runtime: &mut WasmRuntime,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        midi_events: &[MidiEvent<'_>],
    ) -> WasmResult<()> {
        let frame_count = i32::try_from(frames)
            .map_err(|_| WasmError::Internal(format!("block of {} frames", frames)))?;

        let input_block = runtime.global(globals::INPUT_BLOCK)?;
        let input_block = runtime.resolve_memory(input_block)?;
        runtime.write_f32_block(input_block, inputs, self.info.num_inputs as usize, frames)?;

        if !midi_events.is_empty() {
            let midi_block = runtime.global(globals::MIDI_BLOCK)?;
            let midi_block = runtime.resolve_memory(midi_block)?;
            runtime.write_midi_events(midi_block, midi_events)?;
        }

        runtime.call_function_into(
            abi::RUN,
            &[
                WasmValue::I32(frame_count),
                WasmValue::I32(midi_events.len() as i32),
            ],
            &mut [],
        )?;

        let output_block = runtime.global(globals::OUTPUT_BLOCK)?;
        let output_block = runtime.resolve_memory(output_block)?;
        runtime.read_f32_block(output_block, outputs, self.info.num_outputs as usize, frames)
    }
}

fn describe(op: &str, err: &WasmError) -> String {
    match err {
        WasmError::MissingInstance(_) => err.to_string(),
        other => format!("{}() : {}", op, other),
    }
}

fn silence(outputs: &mut [&mut [f32]], frames: usize) {
    for output in outputs.iter_mut() {
        let n = frames.min(output.len());
        output[..n].fill(0.0);
    }
}

impl AudioPlugin for WasmHostPlugin {
    fn label(&self) -> String {
        self.guest_string(abi::GET_LABEL)
    }

    fn maker(&self) -> String {
        self.guest_string(abi::GET_MAKER)
    }

    fn license(&self) -> String {
        self.guest_string(abi::GET_LICENSE)
    }

    fn version(&self) -> u32 {
        self.guarded(abi::GET_VERSION, 0, |slot| {
            let version = slot.runtime.call_function_single(abi::GET_VERSION, &[])?;
            i32::from_value(version)
                .map(|v| v as u32)
                .ok_or_else(|| WasmError::type_mismatch(i32::TYPE, version.kind()))
        })
    }

    fn unique_id(&self) -> i64 {
        self.guarded(abi::GET_UNIQUE_ID, 0, |slot| {
            let id = slot.runtime.call_function_single(abi::GET_UNIQUE_ID, &[])?;
            i64::from_value(id).ok_or_else(|| WasmError::type_mismatch(i64::TYPE, id.kind()))
        })
    }

    fn init_parameter(&self, index: u32) -> Parameter {
        self.guarded(abi::INIT_PARAMETER, Parameter::default(), |slot| {
            slot.runtime
                .call_function_into(abi::INIT_PARAMETER, &[WasmValue::I32(index as i32)], &mut [])?;
            Ok(ParameterRecord::read(&mut slot.runtime)?.into())
        })
    }

    fn parameter_value(&self, index: u32) -> f32 {
        self.guarded(abi::GET_PARAMETER_VALUE, 0.0, |slot| {
            let value = slot
                .runtime
                .call_function_single(abi::GET_PARAMETER_VALUE, &[WasmValue::I32(index as i32)])?;
            f32::from_value(value).ok_or_else(|| WasmError::type_mismatch(f32::TYPE, value.kind()))
        })
    }

    fn set_parameter_value(&self, index: u32, value: f32) {
        self.guarded(abi::SET_PARAMETER_VALUE, (), |slot| {
            slot.runtime.call_function_into(
                abi::SET_PARAMETER_VALUE,
                &[WasmValue::I32(index as i32), WasmValue::F32(value)],
                &mut [],
            )
        })
    }

    fn init_program_name(&self, index: u32) -> String {
        self.guarded(abi::INIT_PROGRAM_NAME, String::new(), |slot| {
            slot.runtime
                .call_function_cstring(abi::INIT_PROGRAM_NAME, &[WasmValue::I32(index as i32)])
        })
    }

    fn load_program(&self, index: u32) {
        self.guarded(abi::LOAD_PROGRAM, (), |slot| {
            slot.runtime
                .call_function_into(abi::LOAD_PROGRAM, &[WasmValue::I32(index as i32)], &mut [])
        })
    }

    fn init_state(&self, index: u32) -> StateDescriptor {
        self.guarded(abi::INIT_STATE, StateDescriptor::default(), |slot| {
            slot.runtime
                .call_function_into(abi::INIT_STATE, &[WasmValue::I32(index as i32)], &mut [])?;
            Ok(StateRecord::read(&mut slot.runtime)?.into())
        })
    }

    fn set_state(&self, key: &str, value: &str) {
        self.stored_state
            .lock()
            .insert(key.to_string(), value.to_string());

        self.guarded(abi::SET_STATE, (), |slot| {
            let (key_ptr, value_ptr) =
                transfer::write_state_strings(&mut slot.runtime, key, Some(value))?;
            let value_ptr = value_ptr.unwrap_or(WasmValue::I32(0));
            slot.runtime
                .call_function_into(abi::SET_STATE, &[key_ptr, value_ptr], &mut [])
        })
    }

    fn state(&self, key: &str) -> String {
        self.guarded(abi::GET_STATE, String::new(), |slot| {
            let (key_ptr, _) = transfer::write_state_strings(&mut slot.runtime, key, None)?;
            slot.runtime.call_function_cstring(abi::GET_STATE, &[key_ptr])
        })
    }

    fn activate(&self) {
        self.guarded(abi::ACTIVATE, (), |slot| {
            slot.runtime.call_function_into(abi::ACTIVATE, &[], &mut [])?;
            slot.active = true;
            Ok(())
        })
    }

    fn deactivate(&self) {
        self.guarded(abi::DEACTIVATE, (), |slot| {
            slot.runtime.call_function_into(abi::DEACTIVATE, &[], &mut [])?;
            slot.active = false;
            Ok(())
        })
    }

    fn run(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        midi_events: &[MidiEvent<'_>],
    ) {
        let mut slot = self.guest.lock();
        if !slot.runtime.has_instance() {
            drop(slot);
            trace!("{}() : missing wasm instance", abi::RUN);
            silence(outputs, frames);
            return;
        }
        if frames == 0 && midi_events.is_empty() {
            return;
        }

        let result = self.process(&mut slot.runtime, inputs, outputs, frames, midi_events);
        drop(slot);

        if let Err(e) = result {
            self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
            silence(outputs, frames);
            trace!("{}", describe(abi::RUN, &e));
        }
    }
}
