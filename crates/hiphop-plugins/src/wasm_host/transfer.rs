//! Transfer records: groups of exported globals that together carry one
//! value across the boundary. Each record is read or written in one go while
//! the caller holds the engine lock.

use hiphop_kernel::{Parameter, ParameterRanges, StateDescriptor, TimePosition};

use super::abi::globals;
use crate::wasm_runtime::{GuestAccess, WasmResult, WasmValue};

/// Parameter description left behind by `_init_parameter`
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRecord {
    pub hints: i32,
    pub name: String,
    pub def: f32,
    pub min: f32,
    pub max: f32,
}

impl ParameterRecord {
    pub fn read(guest: &mut impl GuestAccess) -> WasmResult<Self> {
        Ok(Self {
            hints: guest.global_as(globals::INT32_1)?,
            name: guest.global_cstring(globals::RO_STRING_1)?,
            def: guest.global_as(globals::FLOAT32_1)?,
            min: guest.global_as(globals::FLOAT32_2)?,
            max: guest.global_as(globals::FLOAT32_3)?,
        })
    }
}

impl From<ParameterRecord> for Parameter {
    fn from(record: ParameterRecord) -> Self {
        Parameter {
            hints: record.hints as u32,
            name: record.name,
            ranges: ParameterRanges::new(record.def, record.min, record.max),
        }
    }
}

/// State key and default value left behind by `_init_state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub key: String,
    pub default_value: String,
}

impl StateRecord {
    pub fn read(guest: &mut impl GuestAccess) -> WasmResult<Self> {
        Ok(Self {
            key: guest.global_cstring(globals::RO_STRING_1)?,
            default_value: guest.global_cstring(globals::RO_STRING_2)?,
        })
    }
}

impl From<StateRecord> for StateDescriptor {
    fn from(record: StateRecord) -> Self {
        StateDescriptor {
            key: record.key,
            default_value: record.default_value,
        }
    }
}

/// Transport snapshot written for `_get_time_position`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportRecord {
    pub playing: bool,
    pub frame: u64,
}

impl TransportRecord {
    pub fn write(&self, guest: &mut impl GuestAccess) -> WasmResult<()> {
        guest.set_global(globals::INT32_1, WasmValue::I32(self.playing as i32))?;
        guest.set_global(globals::INT64_1, WasmValue::I64(self.frame as i64))
    }
}

impl From<TimePosition> for TransportRecord {
    fn from(pos: TimePosition) -> Self {
        Self {
            playing: pos.playing,
            frame: pos.frame,
        }
    }
}

/// Copy `key` (and `value`) into the guest-provided string buffers,
/// returning the buffer pointers to pass to `_set_state` / `_get_state`
pub fn write_state_strings(
    guest: &mut impl GuestAccess,
    key: &str,
    value: Option<&str>,
) -> WasmResult<(WasmValue, Option<WasmValue>)> {
    let key_ptr = guest.global(globals::RW_STRING_1)?;
    guest.write_cstring(key_ptr.as_ptr()?, key)?;

    let value_ptr = match value {
        Some(value) => {
            let ptr = guest.global(globals::RW_STRING_2)?;
            guest.write_cstring(ptr.as_ptr()?, value)?;
            Some(ptr)
        }
        None => None,
    };
    Ok((key_ptr, value_ptr))
}
