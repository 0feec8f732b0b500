//! Host functions offered to guests, backed by the embedding [`PluginHost`].

use std::sync::Arc;
use tracing::{error, trace};

use hiphop_kernel::PluginHost;

use super::abi::{globals, imports};
use super::transfer::TransportRecord;
use crate::wasm_runtime::{
    GuestAccess, GuestPtr, HostCaller, HostFunctionMap, WasmError, WasmResult, WasmType, WasmValue,
};

/// Longest abort message decoded, in UTF-16 code units
const MAX_ABORT_MESSAGE: usize = 1024;

/// Build the import table for one load
pub fn host_functions(host: &Arc<dyn PluginHost>) -> HostFunctionMap {
    let samplerate_host = Arc::clone(host);
    let transport_host = Arc::clone(host);
    let midi_host = Arc::clone(host);

    HostFunctionMap::new()
        .with(
            imports::GET_SAMPLERATE,
            vec![],
            vec![WasmType::F32],
            move |_, _, results| {
                results[0] = WasmValue::F32(samplerate_host.sample_rate() as f32);
                Ok(())
            },
        )
        .with(
            imports::GET_TIME_POSITION,
            vec![],
            vec![],
            move |caller, _, _| {
                let record = TransportRecord::from(transport_host.time_position());
                if let Err(e) = record.write(caller) {
                    trace!("{}(): {}", imports::GET_TIME_POSITION, e);
                }
                Ok(())
            },
        )
        .with(
            imports::WRITE_MIDI_EVENT,
            vec![],
            vec![WasmType::I32],
            move |caller, _, results| {
                let written = match forward_midi_event(caller, midi_host.as_ref()) {
                    Ok(written) => written,
                    Err(e) => {
                        trace!("{}(): {}", imports::WRITE_MIDI_EVENT, e);
                        false
                    }
                };
                results[0] = WasmValue::I32(written as i32);
                Ok(())
            },
        )
        .with(
            imports::ABORT,
            vec![WasmType::I32; 4],
            vec![],
            |caller, args, _| {
                let message = read_as_string(caller, args[0].as_ptr()?).unwrap_or_default();
                let file = read_as_string(caller, args[1].as_ptr()?).unwrap_or_default();
                let line = args[2].as_i32().unwrap_or_default();
                let column = args[3].as_i32().unwrap_or_default();

                let reason = format!("{} at {}:{}:{}", message, file, line, column);
                error!("Guest aborted: {}", reason);
                Err(WasmError::Trap {
                    function: imports::ABORT.to_string(),
                    reason,
                })
            },
        )
}

/// Read the event the guest left at `_rw_midi_block` and hand it to the host
fn forward_midi_event(caller: &mut HostCaller<'_>, host: &dyn PluginHost) -> WasmResult<bool> {
    let block = caller.global(globals::MIDI_BLOCK)?.as_ptr()?;
    caller.with_midi_event(GuestPtr(block), |event| host.write_midi_event(event))
}

/// Decode an AssemblyScript string: UTF-16LE code units preceded by their
/// byte length as a u32 at `ptr - 4`
fn read_as_string(caller: &mut HostCaller<'_>, ptr: u32) -> WasmResult<String> {
    if ptr < 4 {
        return Ok(String::new());
    }
    let mut header = [0u8; 4];
    caller.read_memory(GuestPtr(ptr - 4), &mut header)?;
    let len = (u32::from_le_bytes(header) as usize).min(MAX_ABORT_MESSAGE * 2) & !1;

    let mut bytes = vec![0u8; len];
    caller.read_memory(GuestPtr(ptr), &mut bytes)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}
