//! Plugin adapter behaviour against a real guest

mod common;

use common::*;
use hiphop_kernel::{AudioPlugin, MidiEvent, TimePosition, hints};
use hiphop_plugins::WasmError;

#[test]
fn test_metadata() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    assert!(plugin.has_instance());
    assert_eq!(plugin.label(), "Gain");
    assert_eq!(plugin.maker(), "Hip-Hop");
    assert_eq!(plugin.license(), "ISC");
    assert_eq!(plugin.version(), 0x10203);
    assert_eq!(plugin.unique_id(), 0x48697048);
}

#[test]
fn test_init_parameter_reads_transfer_record() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    let param = plugin.init_parameter(0);
    assert_eq!(param.name, "Volume");
    assert!(param.has_hint(hints::AUTOMATABLE));
    assert_eq!(param.ranges.def, 1.0);
    assert_eq!(param.ranges.min, 0.0);
    assert_eq!(param.ranges.max, 2.0);
}

#[test]
fn test_parameter_round_trip_and_clamp() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    plugin.set_parameter_value(0, 0.25);
    assert_eq!(plugin.parameter_value(0), 0.25);

    plugin.set_parameter_value(0, 5.0);
    assert_eq!(plugin.parameter_value(0), 2.0);

    plugin.set_parameter_value(0, -1.0);
    assert_eq!(plugin.parameter_value(0), 0.0);
}

#[test]
fn test_programs() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    assert_eq!(plugin.init_program_name(0), "Default");
    plugin.set_parameter_value(0, 0.5);
    plugin.load_program(0);
    assert_eq!(plugin.parameter_value(0), 1.0);
}

#[test]
fn test_state() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    let state = plugin.init_state(0);
    assert_eq!(state.key, "mode");
    assert_eq!(state.default_value, "stereo");

    assert_eq!(plugin.state("mode"), "stereo");
    plugin.set_state("mode", "mono");
    assert_eq!(plugin.state("mode"), "mono");
    assert_eq!(
        plugin.stored_state().get("mode").map(String::as_str),
        Some("mono")
    );
}

#[test]
fn test_run_applies_gain_when_active() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    let (left, right) = test_signal(FRAMES);

    // inactive guest outputs silence
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    assert!(out_l.iter().all(|&s| s == 0.0));

    plugin.activate();
    assert!(plugin.is_active());
    plugin.set_parameter_value(0, 0.5);
    let (out_l, out_r) = process(&plugin, &left, &right, &[]);
    for i in 0..FRAMES {
        assert_eq!(out_l[i], left[i] * 0.5);
        assert_eq!(out_r[i], right[i] * 0.5);
    }
    assert_eq!(plugin.dropped_blocks(), 0);

    plugin.deactivate();
    assert!(!plugin.is_active());
}

#[test]
fn test_midi_events_reach_guest_and_come_back() {
    let host = TestHost::new();
    let plugin = plugin_with_host(host.clone());
    plugin.load_wasm_binary(gain_guest(1.0).as_bytes()).unwrap();
    plugin.activate();

    let (left, right) = test_signal(FRAMES);
    let note_on = [0x90, 0x3C, 0x7F];
    let sysex = [0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7];
    let events = [MidiEvent::new(5, &note_on), MidiEvent::new(9, &sysex)];
    process(&plugin, &left, &right, &events);

    // the guest echoes the first event of the block
    assert_eq!(*host.midi.lock(), vec![(5, note_on.to_vec())]);
}

#[test]
fn test_transport_is_queried_per_block() {
    let host = TestHost::new();
    *host.position.lock() = TimePosition {
        playing: true,
        frame: 96000,
    };
    let plugin = plugin_with_host(host);
    plugin.load_wasm_binary(gain_guest(1.0).as_bytes()).unwrap();
    plugin.activate();

    let (left, right) = test_signal(FRAMES);
    process(&plugin, &left, &right, &[]);
    assert_eq!(plugin.dropped_blocks(), 0);
}

#[test]
fn test_zero_frames_is_a_no_op() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    plugin.activate();
    let mut out_l: [f32; 0] = [];
    let mut out_r: [f32; 0] = [];
    let mut outputs: Vec<&mut [f32]> = vec![&mut out_l[..], &mut out_r[..]];
    plugin.run(&[&[], &[]], &mut outputs, 0, &[]);
    assert_eq!(plugin.dropped_blocks(), 0);
}

#[test]
fn test_trap_silences_block_and_keeps_instance() {
    let plugin = loaded_plugin(&trapping_guest());
    plugin.activate();

    let (left, right) = test_signal(1024);
    let (out_l, out_r) = process(&plugin, &left, &right, &[]);
    assert!(out_l.iter().chain(&out_r).all(|&s| s == 0.0));
    assert_eq!(plugin.dropped_blocks(), 1);
    assert!(plugin.has_instance());

    // next short block processes normally
    let (left, right) = test_signal(FRAMES);
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    assert_eq!(out_l, left);
    assert_eq!(plugin.dropped_blocks(), 1);
}

#[test]
fn test_guest_memory_fault_is_contained() {
    let plugin = loaded_plugin(&out_of_bounds_guest());
    plugin.activate();
    let (left, right) = test_signal(FRAMES);
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    assert!(out_l.iter().all(|&s| s == 0.0));
    assert_eq!(plugin.dropped_blocks(), 1);
    assert!(plugin.has_instance());
}

#[test]
fn test_output_block_outside_memory_is_silenced() {
    let plugin = loaded_plugin(&bad_output_block_guest());
    plugin.activate();
    let (left, right) = test_signal(FRAMES);
    let (out_l, out_r) = process(&plugin, &left, &right, &[]);
    assert!(out_l.iter().chain(&out_r).all(|&s| s == 0.0));
    assert_eq!(plugin.dropped_blocks(), 1);
}

#[test]
fn test_missing_run_export_fails_load() {
    let plugin = plugin_with_host(TestHost::new());
    let err = plugin
        .load_wasm_binary(guest_without_run().as_bytes())
        .unwrap_err();
    assert!(matches!(err, WasmError::UnknownExport(ref name) if name == "_run"));
    assert!(!plugin.has_instance());
    assert_eq!(plugin.label(), "Error");
}

#[test]
fn test_missing_import_fails_load() {
    let guest = r#"
        (module
            (import "env" "_get_unknown" (func))
            (memory (export "memory") 1))
    "#;
    let plugin = plugin_with_host(TestHost::new());
    assert!(matches!(
        plugin.load_wasm_binary(guest.as_bytes()),
        Err(WasmError::InstantiationError(_))
    ));
    assert!(!plugin.has_instance());
}

#[test]
fn test_reload_matches_fresh_load() {
    let (left, right) = test_signal(FRAMES);

    let reloaded = loaded_plugin(&gain_guest(1.0));
    reloaded.activate();
    reloaded.set_parameter_value(0, 0.5);
    process(&reloaded, &left, &right, &[]);
    reloaded
        .load_wasm_binary(gain_guest(0.25).as_bytes())
        .unwrap();

    let fresh = loaded_plugin(&gain_guest(0.25));
    fresh.activate();

    // activation survives the reload, guest state does not
    assert!(reloaded.is_active());
    assert_eq!(reloaded.parameter_value(0), 1.0);
    assert_eq!(
        process(&reloaded, &left, &right, &[]),
        process(&fresh, &left, &right, &[])
    );
}

#[test]
fn test_failed_reload_leaves_no_instance() {
    let plugin = loaded_plugin(&gain_guest(1.0));
    plugin.activate();
    assert!(plugin.load_wasm_binary(b"(module (func").is_err());
    assert!(!plugin.has_instance());

    let (left, right) = test_signal(FRAMES);
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    assert!(out_l.iter().all(|&s| s == 0.0));

    // a later good binary brings it back, still active
    plugin.load_wasm_binary(gain_guest(1.0).as_bytes()).unwrap();
    let (out_l, _) = process(&plugin, &left, &right, &[]);
    assert_eq!(out_l, left);
}

#[test]
fn test_from_config_loads_relative_binary() {
    use hiphop_kernel::config::HostConfig;

    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("dsp")).unwrap();
    std::fs::write(dir.path().join("dsp/optimized.wasm"), gain_guest(1.0)).unwrap();

    let config = HostConfig::new().with_plugin_info(test_info());
    let plugin = hiphop_plugins::WasmHostPlugin::from_config(
        &config,
        dir.path(),
        TestHost::new(),
    )
    .unwrap();
    assert_eq!(plugin.label(), "Gain");

    let missing = hiphop_plugins::WasmHostPlugin::from_config(
        &config,
        &dir.path().join("elsewhere"),
        TestHost::new(),
    )
    .unwrap();
    assert!(!missing.has_instance());
}
