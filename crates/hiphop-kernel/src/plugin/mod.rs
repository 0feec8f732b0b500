use serde::{Deserialize, Serialize};

pub mod parameter;
pub use parameter::{hints, Parameter, ParameterRanges};

// ============================================================================
// 宿主接口 (Host SDK boundary)
// ============================================================================

/// Size of the inline data of a short MIDI message
pub const MIDI_DATA_SIZE: usize = 4;

/// MIDI event delivered to or emitted by a plugin
///
/// `data` borrows from whoever owns the event storage (host SDK buffers on
/// input, guest linear memory scratch space on output), so no allocation
/// happens on the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent<'a> {
    /// Frame offset inside the current block
    pub frame: u32,
    /// Raw MIDI bytes
    pub data: &'a [u8],
}

impl<'a> MidiEvent<'a> {
    pub fn new(frame: u32, data: &'a [u8]) -> Self {
        Self { frame, data }
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether the event does not fit into a short message (SysEx etc.)
    pub fn is_extended(&self) -> bool {
        self.data.len() > MIDI_DATA_SIZE
    }
}

/// Transport state reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePosition {
    /// Whether the transport is rolling
    pub playing: bool,
    /// Current transport position in frames
    pub frame: u64,
}

/// Key and default value of a plugin state slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDescriptor {
    pub key: String,
    pub default_value: String,
}

/// Static shape of a plugin as compiled into the host SDK glue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub parameter_count: u32,
    pub program_count: u32,
    pub state_count: u32,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 2,
            parameter_count: 128,
            program_count: 0,
            state_count: 0,
        }
    }
}

/// Services the host SDK offers to a running plugin
///
/// Implementations are called from the audio thread while a block is being
/// processed, so they must not block.
pub trait PluginHost: Send + Sync {
    /// Current sample rate in Hz
    fn sample_rate(&self) -> f64;

    /// Current transport position
    fn time_position(&self) -> TimePosition;

    /// Forward a MIDI event to the host output, returns whether it was accepted
    fn write_midi_event(&self, event: &MidiEvent<'_>) -> bool;
}

/// Plugin interface driven by the host SDK
///
/// Every method takes `&self`: the host calls `run` from the real-time
/// thread and everything else from a control thread, so implementations
/// synchronize internally. None of the methods fail; implementations degrade
/// to the documented default and report the problem through logging.
pub trait AudioPlugin: Send + Sync {
    fn label(&self) -> String;
    fn maker(&self) -> String;
    fn license(&self) -> String;
    fn version(&self) -> u32;
    fn unique_id(&self) -> i64;

    /// Describe parameter `index`
    fn init_parameter(&self, index: u32) -> Parameter;
    fn parameter_value(&self, index: u32) -> f32;
    fn set_parameter_value(&self, index: u32, value: f32);

    fn init_program_name(&self, _index: u32) -> String {
        String::new()
    }

    fn load_program(&self, _index: u32) {}

    fn init_state(&self, _index: u32) -> StateDescriptor {
        StateDescriptor::default()
    }

    fn set_state(&self, _key: &str, _value: &str) {}

    fn state(&self, _key: &str) -> String {
        String::new()
    }

    fn activate(&self);
    fn deactivate(&self);

    /// Process one block of `frames` samples per channel
    fn run(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        midi_events: &[MidiEvent<'_>],
    );
}
