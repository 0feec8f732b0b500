//! WASM Runtime Core
//!
//! Owns the engine and the single live guest instance. Every named access
//! goes through the exports map built at instantiation, so a reload can
//! never leave a caller holding a stale handle.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};
use wasmtime::{
    AsContextMut, Config, Engine, Extern, Global, Instance, Linker, Memory, Module,
    Mutability, ResourceLimiter, Store, Trap, Val,
};

use hiphop_kernel::MidiEvent;
use hiphop_kernel::config::HostConfig;

use super::host::{self, HostFunctionMap};
use super::memory::{self, GuestPtr};
use super::types::{
    ModuleSource, ResourceLimits, WasmError, WasmPrimitive, WasmResult, WasmType, WasmValue,
};

/// Name of the linear memory export
pub const MEMORY_EXPORT: &str = "memory";

/// Upper bound on parameters or results of a single call
pub const MAX_CALL_VALUES: usize = 16;

/// Optimization level for compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    None,
    Speed,
    SpeedAndSize,
}

/// WASM runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Resource limits
    pub resource_limits: ResourceLimits,
    /// Cranelift optimization level
    pub optimization_level: OptimizationLevel,
    /// Enable parallel compilation
    pub parallel_compilation: bool,
    /// Longest string read out of guest memory
    pub max_string_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            resource_limits: ResourceLimits::default(),
            optimization_level: OptimizationLevel::Speed,
            parallel_compilation: true,
            max_string_len: 4096,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_host_config(host: &HostConfig) -> Self {
        let mut config = Self::default();
        config.resource_limits.max_memory_pages = host.max_memory_pages;
        config.max_string_len = host.max_string_len;
        config
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_max_string_len(mut self, len: usize) -> Self {
        self.max_string_len = len;
        self
    }

    /// Convert to wasmtime Config
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();

        config.wasm_multi_value(true);
        config.wasm_bulk_memory(true);
        config.max_wasm_stack(self.resource_limits.max_wasm_stack);

        match self.optimization_level {
            OptimizationLevel::None => {
                config.cranelift_opt_level(wasmtime::OptLevel::None);
            }
            OptimizationLevel::Speed => {
                config.cranelift_opt_level(wasmtime::OptLevel::Speed);
            }
            OptimizationLevel::SpeedAndSize => {
                config.cranelift_opt_level(wasmtime::OptLevel::SpeedAndSize);
            }
        }

        config.parallel_compilation(self.parallel_compilation);

        config
    }
}

/// Store limits for resource control
pub struct StoreLimits {
    pub max_memory_bytes: usize,
    pub max_table_elements: usize,
}

impl From<&ResourceLimits> for StoreLimits {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            max_memory_bytes: limits.max_memory_bytes(),
            max_table_elements: limits.max_table_elements as usize,
        }
    }
}

impl ResourceLimiter for StoreLimits {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        let max = maximum.unwrap_or(self.max_memory_bytes);
        Ok(desired <= max && desired <= self.max_memory_bytes)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        let max = maximum.unwrap_or(self.max_table_elements);
        Ok(desired <= max && desired <= self.max_table_elements)
    }
}

/// Data attached to the wasmtime store of the live instance
pub struct HostState {
    pub(crate) limits: StoreLimits,
    pub(crate) max_string_len: usize,
}

/// Runtime statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Total modules compiled
    pub modules_compiled: u64,
    /// Total compilation time in milliseconds
    pub total_compile_time_ms: u64,
    /// Total instances created
    pub instances_created: u64,
    /// Total guest function calls
    pub calls: u64,
    /// Calls that ended in a trap
    pub traps: u64,
}

/// Typed access to the globals and strings of a live instance.
///
/// Implemented by [`WasmRuntime`] for host-initiated calls and by
/// [`HostCaller`](super::host::HostCaller) inside guest-initiated ones.
pub trait GuestAccess {
    /// Read an exported global
    fn global(&mut self, name: &str) -> WasmResult<WasmValue>;

    /// Write an exported mutable global, the kind must match
    fn set_global(&mut self, name: &str, value: WasmValue) -> WasmResult<()>;

    /// Read a null-terminated string at `ptr`
    fn read_cstring(&mut self, ptr: u32) -> WasmResult<String>;

    /// Write `s` plus terminator at `ptr`
    fn write_cstring(&mut self, ptr: u32, s: &str) -> WasmResult<()>;

    /// Read a global, failing unless it holds a `T`
    fn global_as<T: WasmPrimitive>(&mut self, name: &str) -> WasmResult<T> {
        let value = self.global(name)?;
        T::from_value(value).ok_or_else(|| WasmError::type_mismatch(T::TYPE, value.kind()))
    }

    /// Read the string a pointer-holding global points at
    fn global_cstring(&mut self, name: &str) -> WasmResult<String> {
        let ptr = self.global(name)?.as_ptr()?;
        self.read_cstring(ptr)
    }
}

pub(crate) fn read_global(store: impl AsContextMut, global: Global) -> WasmResult<WasmValue> {
    WasmValue::try_from(&global.get(store))
}

pub(crate) fn write_global(
    mut store: impl AsContextMut,
    name: &str,
    global: Global,
    value: WasmValue,
) -> WasmResult<()> {
    let ty = global.ty(&store);
    if !matches!(ty.mutability(), Mutability::Var) {
        return Err(WasmError::type_mismatch(
            "mutable global",
            format!("immutable global {}", name),
        ));
    }
    match WasmType::from_val_type(ty.content()) {
        Some(kind) if kind == value.kind() => {}
        _ => {
            return Err(WasmError::type_mismatch(
                WasmType::describe(ty.content()),
                value.kind(),
            ));
        }
    }
    global
        .set(&mut store, Val::from(value))
        .map_err(|e| WasmError::Internal(e.to_string()))
}

/// Map a failed guest call onto the error taxonomy
pub(crate) fn classify_call_error(function: &str, err: wasmtime::Error) -> WasmError {
    if let Some(trap) = err.downcast_ref::<Trap>() {
        return WasmError::Trap {
            function: function.to_string(),
            reason: trap.to_string(),
        };
    }
    match err.downcast_ref::<WasmError>() {
        Some(WasmError::Trap { reason, .. }) => WasmError::Trap {
            function: function.to_string(),
            reason: reason.clone(),
        },
        Some(WasmError::MemoryOutOfBounds { offset, size }) => WasmError::MemoryOutOfBounds {
            offset: *offset,
            size: *size,
        },
        Some(other) => WasmError::HostFunctionError(other.to_string()),
        None => WasmError::Internal(format!("{} failed: {:#}", function, err)),
    }
}

struct LiveInstance {
    store: Store<HostState>,
    _instance: Instance,
    exports: HashMap<String, Extern>,
}

impl LiveInstance {
    fn global(&self, name: &str) -> WasmResult<Global> {
        match self.exports.get(name) {
            Some(Extern::Global(g)) => Ok(*g),
            Some(_) => Err(WasmError::type_mismatch("global export", "other export kind")),
            None => Err(WasmError::UnknownExport(name.to_string())),
        }
    }

    fn memory(&self) -> WasmResult<Memory> {
        match self.exports.get(MEMORY_EXPORT) {
            Some(Extern::Memory(m)) => Ok(*m),
            _ => Err(WasmError::UnknownExport(MEMORY_EXPORT.to_string())),
        }
    }
}

/// Engine wrapper holding at most one guest instance
///
/// Lifecycle: unloaded → loaded (`load`) → instantiated (`instantiate`) →
/// unloaded (`unload`, or implicitly at the start of the next `load`).
pub struct WasmRuntime {
    /// Configuration
    config: RuntimeConfig,
    /// Wasmtime engine
    engine: Engine,
    /// Compiled module, present once loaded
    module: Option<Module>,
    /// Store, instance and exports, present once instantiated
    live: Option<LiveInstance>,
    /// Runtime statistics
    stats: RuntimeStats,
}

impl WasmRuntime {
    /// Create a new WASM runtime
    pub fn new(config: RuntimeConfig) -> WasmResult<Self> {
        let engine = Engine::new(&config.to_wasmtime_config())
            .map_err(|e| WasmError::Internal(format!("Failed to create engine: {}", e)))?;

        debug!(
            "WASM runtime created with config: {:?}",
            config.optimization_level
        );

        Ok(Self {
            config,
            engine,
            module: None,
            live: None,
            stats: RuntimeStats::default(),
        })
    }

    /// Create with default configuration
    pub fn default_runtime() -> WasmResult<Self> {
        Self::new(RuntimeConfig::default())
    }

    /// Get the wasmtime engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    /// A module is compiled (instantiated or not)
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    /// An instance exists and can be called
    pub fn has_instance(&self) -> bool {
        self.live.is_some()
    }

    /// Compile a guest binary. Any previous module and instance are torn
    /// down first, even if compilation then fails.
    pub fn load<'a>(&mut self, source: impl Into<ModuleSource<'a>>) -> WasmResult<()> {
        self.unload();

        let owned;
        let bytes = match source.into() {
            ModuleSource::Path(path) => {
                owned = std::fs::read(path)?;
                &owned[..]
            }
            ModuleSource::Bytes(bytes) => bytes,
        };

        let start = Instant::now();
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| WasmError::CompileError(format!("{:#}", e)))?;
        let compile_time = start.elapsed().as_millis() as u64;

        self.stats.modules_compiled += 1;
        self.stats.total_compile_time_ms += compile_time;
        self.module = Some(module);

        info!(
            "Compiled guest module in {}ms ({} bytes)",
            compile_time,
            bytes.len()
        );
        Ok(())
    }

    /// Bind `host_functions`, instantiate the loaded module and rebuild the
    /// exports map. A previous instance of the same module is discarded.
    pub fn instantiate(&mut self, host_functions: &HostFunctionMap) -> WasmResult<()> {
        self.live = None;
        let module = self.module.as_ref().ok_or(WasmError::NotLoaded)?;

        let state = HostState {
            limits: StoreLimits::from(&self.config.resource_limits),
            max_string_len: self.config.max_string_len,
        };
        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(&self.engine);
        let bound = host::link_host_functions(&mut linker, module, host_functions)?;

        let instance = linker.instantiate(&mut store, module).map_err(|e| {
            if let Some(trap) = e.downcast_ref::<Trap>() {
                WasmError::Trap {
                    function: "start".to_string(),
                    reason: trap.to_string(),
                }
            } else {
                WasmError::InstantiationError(format!("{:#}", e))
            }
        })?;

        let exports: HashMap<String, Extern> = instance
            .exports(&mut store)
            .map(|export| (export.name().to_string(), export.into_extern()))
            .collect();

        debug!(
            "Instantiated guest: {} exports, {} host imports bound",
            exports.len(),
            bound
        );

        self.stats.instances_created += 1;
        self.live = Some(LiveInstance {
            store,
            _instance: instance,
            exports,
        });
        Ok(())
    }

    /// Drop the instance, its store and the compiled module. Idempotent.
    pub fn unload(&mut self) {
        if self.live.take().is_some() || self.module.is_some() {
            debug!("Unloading guest module");
        }
        self.module = None;
    }

    /// Whether the live instance exports `name`
    pub fn has_export(&self, name: &str) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.exports.contains_key(name))
    }

    /// Names of all exports of the live instance
    pub fn export_names(&self) -> Vec<&str> {
        self.live
            .as_ref()
            .map(|live| live.exports.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Call an exported function and collect its results
    pub fn call_function(&mut self, name: &str, params: &[WasmValue]) -> WasmResult<Vec<WasmValue>> {
        let count = {
            let live = self.live_ref(name)?;
            match live.exports.get(name) {
                Some(Extern::Func(f)) => f.ty(&live.store).results().len(),
                Some(_) => return Err(WasmError::type_mismatch("function export", "other export kind")),
                None => return Err(WasmError::UnknownExport(name.to_string())),
            }
        };
        let mut results = vec![WasmValue::I32(0); count];
        self.call_function_into(name, params, &mut results)?;
        Ok(results)
    }

    /// Call an exported function, writing its results into `results`.
    ///
    /// Parameter and result arity and kinds are checked against the declared
    /// signature. Does not allocate, so it is safe on the audio thread.
    pub fn call_function_into(
        &mut self,
        name: &str,
        params: &[WasmValue],
        results: &mut [WasmValue],
    ) -> WasmResult<()> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| WasmError::MissingInstance(name.to_string()))?;
        let func = match live.exports.get(name) {
            Some(Extern::Func(f)) => *f,
            Some(_) => return Err(WasmError::type_mismatch("function export", "other export kind")),
            None => return Err(WasmError::UnknownExport(name.to_string())),
        };

        let ty = func.ty(&live.store);
        if ty.params().len() != params.len() {
            return Err(WasmError::type_mismatch(
                format!("{} parameters for {}", ty.params().len(), name),
                params.len(),
            ));
        }
        for (expected, given) in ty.params().zip(params) {
            if WasmType::from_val_type(&expected) != Some(given.kind()) {
                return Err(WasmError::type_mismatch(WasmType::describe(&expected), given.kind()));
            }
        }
        if ty.results().len() != results.len() {
            return Err(WasmError::type_mismatch(
                format!("{} results for {}", ty.results().len(), name),
                results.len(),
            ));
        }
        if params.len() > MAX_CALL_VALUES || results.len() > MAX_CALL_VALUES {
            return Err(WasmError::Internal(format!(
                "{} exceeds {} parameters or results",
                name, MAX_CALL_VALUES
            )));
        }

        let mut args: [Val; MAX_CALL_VALUES] = std::array::from_fn(|_| Val::I32(0));
        for (arg, param) in args.iter_mut().zip(params) {
            *arg = Val::from(*param);
        }
        let mut rets: [Val; MAX_CALL_VALUES] = std::array::from_fn(|_| Val::I32(0));

        self.stats.calls += 1;
        if let Err(e) = func.call(
            &mut live.store,
            &args[..params.len()],
            &mut rets[..results.len()],
        ) {
            let err = classify_call_error(name, e);
            if err.is_trap() {
                self.stats.traps += 1;
            }
            return Err(err);
        }

        for (result, ret) in results.iter_mut().zip(&rets) {
            *result = WasmValue::try_from(ret)?;
        }
        Ok(())
    }

    /// Call a function declared to return exactly one value
    pub fn call_function_single(&mut self, name: &str, params: &[WasmValue]) -> WasmResult<WasmValue> {
        let mut result = [WasmValue::I32(0)];
        self.call_function_into(name, params, &mut result)?;
        Ok(result[0])
    }

    /// Call a function returning a pointer to a null-terminated string
    pub fn call_function_cstring(&mut self, name: &str, params: &[WasmValue]) -> WasmResult<String> {
        let ptr = self.call_function_single(name, params)?.as_ptr()?;
        self.read_cstring(ptr)
    }

    /// Validate an offset value against linear memory
    pub fn resolve_memory(&mut self, offset: WasmValue) -> WasmResult<GuestPtr> {
        let ptr = offset.as_ptr()?;
        let size = self.memory_size()?;
        if ptr as usize >= size {
            return Err(WasmError::out_of_bounds(ptr as usize, 1));
        }
        Ok(GuestPtr(ptr))
    }

    /// Current size of linear memory in bytes
    pub fn memory_size(&mut self) -> WasmResult<usize> {
        let live = self.live_ref(MEMORY_EXPORT)?;
        Ok(live.memory()?.data_size(&live.store))
    }

    /// Copy bytes out of linear memory
    pub fn read_memory(&mut self, ptr: GuestPtr, buf: &mut [u8]) -> WasmResult<()> {
        let memory = self.memory_mut()?;
        let range = memory::checked_range(ptr.as_usize(), buf.len(), memory.len())?;
        buf.copy_from_slice(&memory[range]);
        Ok(())
    }

    /// Copy bytes into linear memory
    pub fn write_memory(&mut self, ptr: GuestPtr, data: &[u8]) -> WasmResult<()> {
        let memory = self.memory_mut()?;
        let range = memory::checked_range(ptr.as_usize(), data.len(), memory.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    /// Copy `channels` audio channels channel-major to `ptr`
    pub fn write_f32_block(
        &mut self,
        ptr: GuestPtr,
        inputs: &[&[f32]],
        channels: usize,
        frames: usize,
    ) -> WasmResult<()> {
        let memory = self.memory_mut()?;
        memory::encode_channels(memory, ptr.as_usize(), inputs, channels, frames)
    }

    /// Copy `channels` audio channels channel-major from `ptr`
    pub fn read_f32_block(
        &mut self,
        ptr: GuestPtr,
        outputs: &mut [&mut [f32]],
        channels: usize,
        frames: usize,
    ) -> WasmResult<()> {
        let memory = self.memory_mut()?;
        memory::decode_channels(memory, ptr.as_usize(), outputs, channels, frames)
    }

    /// Serialize MIDI events at `ptr`, returns bytes written
    pub fn write_midi_events(&mut self, ptr: GuestPtr, events: &[MidiEvent<'_>]) -> WasmResult<usize> {
        let memory = self.memory_mut()?;
        memory::encode_midi_events(memory, ptr.as_usize(), events)
    }

    fn live_ref(&self, op: &str) -> WasmResult<&LiveInstance> {
        self.live
            .as_ref()
            .ok_or_else(|| WasmError::MissingInstance(op.to_string()))
    }

    fn memory_mut(&mut self) -> WasmResult<&mut [u8]> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| WasmError::MissingInstance(MEMORY_EXPORT.to_string()))?;
        let memory = live.memory()?;
        Ok(memory.data_mut(&mut live.store))
    }
}

impl GuestAccess for WasmRuntime {
    fn global(&mut self, name: &str) -> WasmResult<WasmValue> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| WasmError::MissingInstance(name.to_string()))?;
        let global = live.global(name)?;
        read_global(&mut live.store, global)
    }

    fn set_global(&mut self, name: &str, value: WasmValue) -> WasmResult<()> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| WasmError::MissingInstance(name.to_string()))?;
        let global = live.global(name)?;
        write_global(&mut live.store, name, global, value)
    }

    fn read_cstring(&mut self, ptr: u32) -> WasmResult<String> {
        let max_len = self.config.max_string_len;
        let live = self.live_ref(MEMORY_EXPORT)?;
        let memory = live.memory()?;
        memory::read_cstr(memory.data(&live.store), ptr as usize, max_len)
    }

    fn write_cstring(&mut self, ptr: u32, s: &str) -> WasmResult<()> {
        let memory = self.memory_mut()?;
        memory::write_cstr(memory, ptr as usize, s)
    }
}
