//! Host Functions for WASM guests
//!
//! A [`HostFunctionMap`] holds the functions a guest may import, keyed by
//! import name. It is built once per load and bound at instantiation; the
//! import module namespace is ignored.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use wasmtime::{Caller, Extern, ExternType, FuncType, Global, Linker, Memory, Module, Val};

use hiphop_kernel::MidiEvent;

use super::memory::{self, GuestPtr};
use super::runtime::{GuestAccess, HostState, MAX_CALL_VALUES, MEMORY_EXPORT};
use super::types::{WasmError, WasmResult, WasmType, WasmValue};

/// Host callback: receives the calling instance, the arguments and a results
/// slice pre-filled with zeros of the declared kinds
pub type HostCallback = Arc<
    dyn Fn(&mut HostCaller<'_>, &[WasmValue], &mut [WasmValue]) -> WasmResult<()> + Send + Sync,
>;

/// Signature and implementation of one host import
#[derive(Clone)]
pub struct HostFunctionDescriptor {
    pub params: Vec<WasmType>,
    pub results: Vec<WasmType>,
    pub callback: HostCallback,
}

impl std::fmt::Debug for HostFunctionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunctionDescriptor")
            .field("params", &self.params)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

impl HostFunctionDescriptor {
    pub fn new<F>(params: Vec<WasmType>, results: Vec<WasmType>, callback: F) -> Self
    where
        F: Fn(&mut HostCaller<'_>, &[WasmValue], &mut [WasmValue]) -> WasmResult<()>
            + Send
            + Sync
            + 'static,
    {
        Self {
            params,
            results,
            callback: Arc::new(callback),
        }
    }

    fn func_type(&self, linker: &Linker<HostState>) -> FuncType {
        FuncType::new(
            linker.engine(),
            self.params.iter().map(|t| t.to_val_type()),
            self.results.iter().map(|t| t.to_val_type()),
        )
    }

    fn invoke(
        &self,
        caller: Caller<'_, HostState>,
        params: &[Val],
        results: &mut [Val],
    ) -> WasmResult<()> {
        if params.len() > MAX_CALL_VALUES || results.len() > MAX_CALL_VALUES {
            return Err(WasmError::Internal(format!(
                "host import exceeds {} parameters or results",
                MAX_CALL_VALUES
            )));
        }

        let mut args = [WasmValue::I32(0); MAX_CALL_VALUES];
        for (arg, val) in args.iter_mut().zip(params) {
            *arg = WasmValue::try_from(val)?;
        }
        let mut outs = [WasmValue::I32(0); MAX_CALL_VALUES];
        for (out, kind) in outs.iter_mut().zip(&self.results) {
            *out = kind.zero();
        }

        let mut host = HostCaller { caller };
        (self.callback)(&mut host, &args[..params.len()], &mut outs[..results.len()])?;

        for ((slot, out), kind) in results.iter_mut().zip(&outs).zip(&self.results) {
            if out.kind() != *kind {
                return Err(WasmError::type_mismatch(kind, out.kind()));
            }
            *slot = Val::from(*out);
        }
        Ok(())
    }
}

/// Host functions by import name
#[derive(Debug, Clone, Default)]
pub struct HostFunctionMap {
    functions: HashMap<String, HostFunctionDescriptor>,
}

impl HostFunctionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a host function
    pub fn register(&mut self, name: &str, descriptor: HostFunctionDescriptor) {
        self.functions.insert(name.to_string(), descriptor);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<F>(mut self, name: &str, params: Vec<WasmType>, results: Vec<WasmType>, callback: F) -> Self
    where
        F: Fn(&mut HostCaller<'_>, &[WasmValue], &mut [WasmValue]) -> WasmResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, HostFunctionDescriptor::new(params, results, callback));
        self
    }

    pub fn get(&self, name: &str) -> Option<&HostFunctionDescriptor> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Define every function import of `module` that `functions` provides.
///
/// Imports with no matching entry are left unbound so instantiation reports
/// them. Returns the number of imports bound.
pub(crate) fn link_host_functions(
    linker: &mut Linker<HostState>,
    module: &Module,
    functions: &HostFunctionMap,
) -> WasmResult<usize> {
    let mut bound = 0;
    for import in module.imports() {
        if !matches!(import.ty(), ExternType::Func(_)) {
            continue;
        }
        let Some(descriptor) = functions.get(import.name()) else {
            debug!("Guest import {}::{} has no host function", import.module(), import.name());
            continue;
        };

        let ty = descriptor.func_type(linker);
        let descriptor = descriptor.clone();
        linker
            .func_new(import.module(), import.name(), ty, move |caller, params, results| {
                descriptor
                    .invoke(caller, params, results)
                    .map_err(wasmtime::Error::new)
            })
            .map_err(|e| WasmError::InstantiationError(format!("{:#}", e)))?;
        bound += 1;
    }
    Ok(bound)
}

/// View of the calling instance handed to host callbacks.
///
/// Reaches the instance through the caller's own store, so a callback never
/// goes back through the runtime (or any lock around it).
pub struct HostCaller<'a> {
    caller: Caller<'a, HostState>,
}

impl HostCaller<'_> {
    fn memory(&mut self) -> WasmResult<Memory> {
        match self.caller.get_export(MEMORY_EXPORT) {
            Some(Extern::Memory(m)) => Ok(m),
            _ => Err(WasmError::UnknownExport(MEMORY_EXPORT.to_string())),
        }
    }

    fn global_handle(&mut self, name: &str) -> WasmResult<Global> {
        match self.caller.get_export(name) {
            Some(Extern::Global(g)) => Ok(g),
            Some(_) => Err(WasmError::type_mismatch("global export", "other export kind")),
            None => Err(WasmError::UnknownExport(name.to_string())),
        }
    }

    /// Whether the calling instance exports `name`
    pub fn has_export(&mut self, name: &str) -> bool {
        self.caller.get_export(name).is_some()
    }

    pub fn memory_size(&mut self) -> WasmResult<usize> {
        let memory = self.memory()?;
        Ok(memory.data_size(&self.caller))
    }

    pub fn read_memory(&mut self, ptr: GuestPtr, buf: &mut [u8]) -> WasmResult<()> {
        let memory = self.memory()?;
        let data = memory.data(&self.caller);
        let range = memory::checked_range(ptr.as_usize(), buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    /// Decode the MIDI event record at `ptr` and hand it to `f`.
    ///
    /// The event borrows guest memory for the duration of `f` only.
    pub fn with_midi_event<R>(
        &mut self,
        ptr: GuestPtr,
        f: impl FnOnce(&MidiEvent<'_>) -> R,
    ) -> WasmResult<R> {
        let memory = self.memory()?;
        let event = memory::decode_midi_event(memory.data(&self.caller), ptr.as_usize())?;
        trace!(frame = event.frame, size = event.data.len(), "guest midi event");
        Ok(f(&event))
    }
}

impl GuestAccess for HostCaller<'_> {
    fn global(&mut self, name: &str) -> WasmResult<WasmValue> {
        let global = self.global_handle(name)?;
        super::runtime::read_global(&mut self.caller, global)
    }

    fn set_global(&mut self, name: &str, value: WasmValue) -> WasmResult<()> {
        let global = self.global_handle(name)?;
        super::runtime::write_global(&mut self.caller, name, global, value)
    }

    fn read_cstring(&mut self, ptr: u32) -> WasmResult<String> {
        let memory = self.memory()?;
        let max_len = self.caller.data().max_string_len;
        memory::read_cstr(memory.data(&self.caller), ptr as usize, max_len)
    }

    fn write_cstring(&mut self, ptr: u32, s: &str) -> WasmResult<()> {
        let memory = self.memory()?;
        memory::write_cstr(memory.data_mut(&mut self.caller), ptr as usize, s)
    }
}
