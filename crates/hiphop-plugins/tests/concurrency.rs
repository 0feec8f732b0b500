//! Audio thread running blocks while a control thread keeps reloading

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use common::*;
use hiphop_kernel::AudioPlugin;

#[test]
fn test_run_never_observes_torn_instance() {
    let plugin = Arc::new(loaded_plugin(&gain_guest(1.0)));
    plugin.activate();

    let (left, right) = test_signal(FRAMES);
    let old_block: Vec<f32> = left.iter().map(|s| s * 1.0).collect();
    let new_block: Vec<f32> = left.iter().map(|s| s * 0.5).collect();
    let silent = vec![0.0f32; FRAMES];

    let stop = Arc::new(AtomicBool::new(false));
    let reloads = Arc::new(AtomicUsize::new(0));
    let reloader = {
        let plugin = Arc::clone(&plugin);
        let stop = Arc::clone(&stop);
        let reloads = Arc::clone(&reloads);
        thread::spawn(move || {
            let binaries = [gain_guest(0.5), gain_guest(1.0)];
            while !stop.load(Ordering::Relaxed) {
                let n = reloads.load(Ordering::Relaxed);
                plugin
                    .load_wasm_binary(binaries[n % 2].as_bytes())
                    .unwrap();
                reloads.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    let mut blocks = 0;
    while blocks < 500 || reloads.load(Ordering::Relaxed) < 4 {
        blocks += 1;
        assert!(blocks < 1_000_000, "reloader made no progress");
        let (out_l, _) = process(&plugin, &left, &right, &[]);
        assert!(
            out_l == old_block || out_l == new_block || out_l == silent,
            "mixed block: {:?}",
            &out_l[..4]
        );
    }

    stop.store(true, Ordering::Relaxed);
    reloader.join().unwrap();
    assert!(reloads.load(Ordering::Relaxed) >= 4);
    assert!(plugin.has_instance());
    assert!(plugin.is_active());
    assert_eq!(plugin.dropped_blocks(), 0);
}

#[test]
fn test_control_calls_interleave_with_run() {
    let plugin = Arc::new(loaded_plugin(&gain_guest(1.0)));
    plugin.activate();

    let control = {
        let plugin = Arc::clone(&plugin);
        thread::spawn(move || {
            for i in 0..200 {
                let value = (i % 3) as f32 * 0.5;
                plugin.set_parameter_value(0, value);
                assert_eq!(plugin.label(), "Gain");
                assert_eq!(plugin.init_parameter(0).name, "Volume");
            }
        })
    };

    let (left, right) = test_signal(FRAMES);
    for _ in 0..200 {
        let (out_l, _) = process(&plugin, &left, &right, &[]);
        let gain_applied = out_l
            .iter()
            .zip(&left)
            .find(|(_, input)| **input != 0.0)
            .map(|(out, input)| out / input);
        if let Some(gain) = gain_applied {
            assert!([0.0, 0.5, 1.0].iter().any(|g| (g - gain).abs() < 1e-6));
        }
    }

    control.join().unwrap();
    assert_eq!(plugin.dropped_blocks(), 0);
}
