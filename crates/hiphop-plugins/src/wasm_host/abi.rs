//! Names making up the guest calling convention.
//!
//! Guests export functions and globals under these names. Globals whose
//! name starts with `_rw_` are written by the host, `_ro_` ones only read.

pub const GET_LABEL: &str = "_get_label";
pub const GET_MAKER: &str = "_get_maker";
pub const GET_LICENSE: &str = "_get_license";
pub const GET_VERSION: &str = "_get_version";
pub const GET_UNIQUE_ID: &str = "_get_unique_id";

pub const INIT_PARAMETER: &str = "_init_parameter";
pub const GET_PARAMETER_VALUE: &str = "_get_parameter_value";
pub const SET_PARAMETER_VALUE: &str = "_set_parameter_value";

pub const INIT_PROGRAM_NAME: &str = "_init_program_name";
pub const LOAD_PROGRAM: &str = "_load_program";

pub const INIT_STATE: &str = "_init_state";
pub const SET_STATE: &str = "_set_state";
pub const GET_STATE: &str = "_get_state";

pub const ACTIVATE: &str = "_activate";
pub const DEACTIVATE: &str = "_deactivate";
pub const RUN: &str = "_run";

/// Exported globals
pub mod globals {
    pub const INT32_1: &str = "_rw_int32_1";
    pub const INT64_1: &str = "_rw_int64_1";
    pub const FLOAT32_1: &str = "_rw_float32_1";
    pub const FLOAT32_2: &str = "_rw_float32_2";
    pub const FLOAT32_3: &str = "_rw_float32_3";
    pub const RO_STRING_1: &str = "_ro_string_1";
    pub const RO_STRING_2: &str = "_ro_string_2";
    pub const RW_STRING_1: &str = "_rw_string_1";
    pub const RW_STRING_2: &str = "_rw_string_2";

    pub const NUM_INPUTS: &str = "_rw_num_inputs";
    pub const NUM_OUTPUTS: &str = "_rw_num_outputs";

    pub const INPUT_BLOCK: &str = "_rw_input_block";
    pub const OUTPUT_BLOCK: &str = "_rw_output_block";
    pub const MIDI_BLOCK: &str = "_rw_midi_block";
}

/// Host functions a guest may import
pub mod imports {
    pub const GET_SAMPLERATE: &str = "_get_samplerate";
    pub const GET_TIME_POSITION: &str = "_get_time_position";
    pub const WRITE_MIDI_EVENT: &str = "_write_midi_event";
    /// AssemblyScript runtime abort
    pub const ABORT: &str = "abort";
}

/// Exports every guest must provide to be usable
pub const REQUIRED_EXPORTS: &[&str] = &[
    crate::wasm_runtime::MEMORY_EXPORT,
    RUN,
    globals::NUM_INPUTS,
    globals::NUM_OUTPUTS,
    globals::INPUT_BLOCK,
    globals::OUTPUT_BLOCK,
    globals::MIDI_BLOCK,
];
