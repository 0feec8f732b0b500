//! Parameter descriptors exchanged with the host SDK.

use serde::{Deserialize, Serialize};

/// Parameter hint bit flags, as understood by the host SDK.
pub mod hints {
    /// Parameter can be automated by the host.
    pub const AUTOMATABLE: u32 = 0x01;
    /// Parameter value is a boolean (on/off).
    pub const BOOLEAN: u32 = 0x02;
    /// Parameter value is an integer.
    pub const INTEGER: u32 = 0x04;
    /// Parameter uses a logarithmic scale.
    pub const LOGARITHMIC: u32 = 0x08;
    /// Parameter is an output, written by the plugin and read by the host.
    pub const OUTPUT: u32 = 0x10;
    /// Parameter is a trigger, reset to default after each block.
    pub const TRIGGER: u32 = 0x20 | BOOLEAN;
}

/// Default/minimum/maximum of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub def: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            def: 0.0,
            min: 0.0,
            max: 1.0,
        }
    }
}

impl ParameterRanges {
    pub fn new(def: f32, min: f32, max: f32) -> Self {
        Self { def, min, max }
    }

    /// Clamp a value into `[min, max]`
    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Parameter descriptor populated by `AudioPlugin::init_parameter`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Hint bit flags, see [`hints`]
    pub hints: u32,
    /// Human readable name
    pub name: String,
    /// Value ranges
    pub ranges: ParameterRanges,
}

impl Parameter {
    pub fn new(name: &str, ranges: ParameterRanges) -> Self {
        Self {
            hints: hints::AUTOMATABLE,
            name: name.to_string(),
            ranges,
        }
    }

    pub fn with_hints(mut self, hints: u32) -> Self {
        self.hints = hints;
        self
    }

    pub fn has_hint(&self, hint: u32) -> bool {
        self.hints & hint == hint
    }

    pub fn is_output(&self) -> bool {
        self.has_hint(hints::OUTPUT)
    }
}
