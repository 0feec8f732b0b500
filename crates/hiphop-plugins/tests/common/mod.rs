//! Shared fixtures: a gain guest written in WAT and a recording host.

#![allow(dead_code)]

use std::sync::Arc;

use hiphop_kernel::{MidiEvent, PluginHost, PluginInfo, TimePosition};
use hiphop_plugins::WasmHostPlugin;
use hiphop_plugins::wasm_runtime::RuntimeConfig;
use parking_lot::Mutex;

/// Frames per block used by most tests
pub const FRAMES: usize = 64;

const GUEST_TEMPLATE: &str = r#"
(module
  (import "env" "_get_samplerate" (func $samplerate (result f32)))
  (import "env" "_get_time_position" (func $time_position))
  (import "env" "_write_midi_event" (func $write_midi (result i32)))
  (memory (export "memory") 2)

  (global $num_inputs (export "_rw_num_inputs") (mut i32) (i32.const 0))
  (global $num_outputs (export "_rw_num_outputs") (mut i32) (i32.const 0))
  (global $input_block (export "_rw_input_block") i32 (i32.const 8192))
  (global $output_block (export "_rw_output_block") i32 (i32.const __OUTPUT_BLOCK__))
  (global $midi_block (export "_rw_midi_block") i32 (i32.const 73728))
  (global $int32_1 (export "_rw_int32_1") (mut i32) (i32.const 0))
  (global $int64_1 (export "_rw_int64_1") (mut i64) (i64.const 0))
  (global $float32_1 (export "_rw_float32_1") (mut f32) (f32.const 0))
  (global $float32_2 (export "_rw_float32_2") (mut f32) (f32.const 0))
  (global $float32_3 (export "_rw_float32_3") (mut f32) (f32.const 0))
  (global $ro_string_1 (export "_ro_string_1") (mut i32) (i32.const 0))
  (global $ro_string_2 (export "_ro_string_2") (mut i32) (i32.const 0))
  (global (export "_rw_string_1") (mut i32) (i32.const 2048))
  (global (export "_rw_string_2") (mut i32) (i32.const 3072))

  (global $gain (mut f32) (f32.const 1))
  (global $active (mut i32) (i32.const 0))
  (global $state (mut i32) (i32.const 96))

  (data (i32.const 16) "Gain\00")
  (data (i32.const 32) "Hip-Hop\00")
  (data (i32.const 48) "ISC\00")
  (data (i32.const 64) "Volume\00")
  (data (i32.const 80) "mode\00")
  (data (i32.const 96) "stereo\00")
  (data (i32.const 112) "Default\00")

  (func (export "_get_label") (result i32) (i32.const 16))
  (func (export "_get_maker") (result i32) (i32.const 32))
  (func (export "_get_license") (result i32) (i32.const 48))
  (func (export "_get_version") (result i32) (i32.const 0x10203))
  (func (export "_get_unique_id") (result i64) (i64.const 0x48697048))

  (func (export "_init_parameter") (param $index i32)
    (global.set $int32_1 (i32.const 1))
    (global.set $ro_string_1 (i32.const 64))
    (global.set $float32_1 (f32.const 1))
    (global.set $float32_2 (f32.const 0))
    (global.set $float32_3 (f32.const 2)))
  (func (export "_get_parameter_value") (param $index i32) (result f32)
    (global.get $gain))
  (func (export "_set_parameter_value") (param $index i32) (param $value f32)
    (global.set $gain (f32.min (f32.const 2) (f32.max (f32.const 0) (local.get $value)))))

  (func (export "_init_program_name") (param $index i32) (result i32) (i32.const 112))
  (func (export "_load_program") (param $index i32) (global.set $gain (f32.const 1)))

  (func (export "_init_state") (param $index i32)
    (global.set $ro_string_1 (i32.const 80))
    (global.set $ro_string_2 (i32.const 96)))
  (func (export "_set_state") (param $key i32) (param $value i32)
    (memory.copy (i32.const 4096) (local.get $value) (i32.const 64))
    (global.set $state (i32.const 4096)))
  (func (export "_get_state") (param $key i32) (result i32) (global.get $state))

  (func (export "_activate") (global.set $active (i32.const 1)))
  (func (export "_deactivate") (global.set $active (i32.const 0)))

  (func (export "samplerate") (result f32) (call $samplerate))

  (func (export "_run") (param $frames i32) (param $midi_count i32)
    (local $i i32) (local $n i32) (local $scale f32)
    __RUN_PRELUDE__
    (call $time_position)
    (local.set $scale
      (select
        (f32.mul (global.get $gain) (f32.const __SCALE__))
        (f32.const 0)
        (global.get $active)))
    (local.set $n (i32.mul (local.get $frames) (global.get $num_outputs)))
    (block $done
      (loop $next
        (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
        (f32.store
          (i32.add (global.get $output_block) (i32.shl (local.get $i) (i32.const 2)))
          (f32.mul
            (f32.load (i32.add (global.get $input_block) (i32.shl (local.get $i) (i32.const 2))))
            (local.get $scale)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (if (local.get $midi_count)
      (then (drop (call $write_midi)))))
)
"#;

fn build(scale: f32, output_block: u32, run_prelude: &str) -> String {
    GUEST_TEMPLATE
        .replace("__SCALE__", &format!("{:?}", scale))
        .replace("__OUTPUT_BLOCK__", &output_block.to_string())
        .replace("__RUN_PRELUDE__", run_prelude)
}

/// Guest multiplying every input sample by `gain * scale` while active
pub fn gain_guest(scale: f32) -> String {
    build(scale, 40960, "")
}

/// Gain guest that traps on blocks longer than 512 frames
pub fn trapping_guest() -> String {
    build(
        1.0,
        40960,
        "(if (i32.gt_u (local.get $frames) (i32.const 512)) (then unreachable))",
    )
}

/// Gain guest that stores one word past the end of its linear memory
pub fn out_of_bounds_guest() -> String {
    build(1.0, 40960, "(i32.store (i32.const 131072) (i32.const 1))")
}

/// Gain guest whose output block lies outside linear memory
pub fn bad_output_block_guest() -> String {
    build(1.0, 200000, "")
}

/// Gain guest without a `_run` export
pub fn guest_without_run() -> String {
    gain_guest(1.0).replace("(export \"_run\")", "(export \"_process\")")
}

/// Host recording MIDI output, with a fixed transport position
pub struct TestHost {
    pub midi: Mutex<Vec<(u32, Vec<u8>)>>,
    pub position: Mutex<TimePosition>,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            midi: Mutex::new(Vec::new()),
            position: Mutex::new(TimePosition::default()),
        })
    }
}

impl PluginHost for TestHost {
    fn sample_rate(&self) -> f64 {
        48000.0
    }

    fn time_position(&self) -> TimePosition {
        *self.position.lock()
    }

    fn write_midi_event(&self, event: &MidiEvent<'_>) -> bool {
        self.midi.lock().push((event.frame, event.data.to_vec()));
        true
    }
}

/// Stereo plugin with a handful of parameters
pub fn test_info() -> PluginInfo {
    PluginInfo {
        num_inputs: 2,
        num_outputs: 2,
        parameter_count: 4,
        program_count: 1,
        state_count: 1,
    }
}

pub fn plugin_with_host(host: Arc<TestHost>) -> WasmHostPlugin {
    WasmHostPlugin::new(test_info(), RuntimeConfig::default(), host).unwrap()
}

/// Adapter with `guest` loaded
pub fn loaded_plugin(guest: &str) -> WasmHostPlugin {
    let plugin = plugin_with_host(TestHost::new());
    plugin.load_wasm_binary(guest.as_bytes()).unwrap();
    plugin
}

/// Deterministic stereo test signal
pub fn test_signal(frames: usize) -> (Vec<f32>, Vec<f32>) {
    let left = (0..frames).map(|i| (i as f32 * 0.1).sin()).collect();
    let right = (0..frames).map(|i| (i as f32 * 0.07).cos() * 0.5).collect();
    (left, right)
}

/// Run one stereo block, returning both output channels
pub fn process(
    plugin: &WasmHostPlugin,
    left: &[f32],
    right: &[f32],
    midi: &[MidiEvent<'_>],
) -> (Vec<f32>, Vec<f32>) {
    use hiphop_kernel::AudioPlugin;

    let frames = left.len();
    let mut out_l = vec![f32::NAN; frames];
    let mut out_r = vec![f32::NAN; frames];
    {
        let mut outputs: Vec<&mut [f32]> = vec![&mut out_l[..], &mut out_r[..]];
        plugin.run(&[left, right], &mut outputs, frames, midi);
    }
    (out_l, out_r)
}
