use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use rtjit::{DspHost, HostConfig};

mod support;
use support::require_toolchain;

const FRAMES: usize = 32;

#[test]
fn concurrent_recompiles_never_mix_bindings() -> Result<()> {
    require_toolchain!();
    let dir = support::temp_dir("rtjit-swap");
    support::install(dir.path(), "tag_a.cc", "a.cc")?;
    support::install(dir.path(), "tag_b.cc", "b.cc")?;

    let config = HostConfig {
        jit: support::options(),
        ..HostConfig::new(dir.path())
    };
    let (host, mut processor) = DspHost::start(config, Path::new("a.cc"))?;
    assert!(processor.activate(44_100.0, 1, FRAMES as u32));

    let stop = Arc::new(AtomicBool::new(false));
    let audio = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let silence = [0.0f32; FRAMES];
            let mut blocks = 0u64;
            while !stop.load(Ordering::Acquire) {
                let mut left = [0.0f32; FRAMES];
                let mut right = [0.0f32; FRAMES];
                {
                    let inputs: [&[f32]; 2] = [&silence, &silence];
                    let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
                    processor.process(&inputs, &mut outputs);
                }
                let first = left[0];
                assert!(first == 1.0 || first == 2.0, "unexpected sample {first}");
                assert!(left.iter().chain(right.iter()).all(|&s| s == first));
                blocks += 1;
            }
            (processor, blocks)
        })
    };

    for round in 0..6 {
        let source = if round % 2 == 0 { "b.cc" } else { "a.cc" };
        host.select(Path::new(source));
        assert!(host.recompile().is_success());
        host.collect_retired();
    }

    stop.store(true, Ordering::Release);
    let (processor, blocks) = audio.join().expect("audio thread panicked");
    assert!(blocks > 0);
    assert!(processor.generation() <= host.status().generation);
    drop(processor);
    host.collect_retired();
    Ok(())
}

#[test]
fn parallel_control_threads_keep_newest_binding() -> Result<()> {
    require_toolchain!();
    let dir = support::temp_dir("rtjit-swap");
    support::install(dir.path(), "tag_a.cc", "dsp.cc")?;

    let config = HostConfig {
        jit: support::options(),
        ..HostConfig::new(dir.path())
    };
    let (host, mut processor) = DspHost::start(config, Path::new("dsp.cc"))?;

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..3).map(|_| scope.spawn(|| host.recompile())).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("compile thread panicked"))
            .collect()
    });
    assert!(reports.iter().any(|report| report.is_success()));

    let silence = [0.0f32; FRAMES];
    let mut out = [0.0f32; FRAMES];
    {
        let inputs: [&[f32]; 1] = [&silence];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        processor.process(&inputs, &mut outputs);
    }
    assert_eq!(processor.generation(), host.status().generation);
    assert!(out.iter().all(|&s| s == 1.0));
    Ok(())
}

#[test]
fn swapped_binding_starts_with_fresh_state() -> Result<()> {
    require_toolchain!();
    let dir = support::temp_dir("rtjit-swap");
    support::install(dir.path(), "block_counter.cc", "dsp.cc")?;

    let config = HostConfig {
        jit: support::options(),
        ..HostConfig::new(dir.path())
    };
    let (host, mut processor) = DspHost::start(config, Path::new("dsp.cc"))?;
    assert!(processor.activate(48_000.0, 1, FRAMES as u32));

    let mut next_block = || {
        let silence = [0.0f32; FRAMES];
        let mut out = [0.0f32; FRAMES];
        {
            let inputs: [&[f32]; 1] = [&silence];
            let mut outputs: [&mut [f32]; 1] = [&mut out];
            processor.process(&inputs, &mut outputs);
        }
        out[0]
    };
    assert_eq!(next_block(), 1.0);
    assert_eq!(next_block(), 2.0);
    assert_eq!(next_block(), 3.0);

    assert!(host.recompile().is_success());
    assert_eq!(next_block(), 1.0);
    assert_eq!(next_block(), 2.0);
    assert_eq!(host.collect_retired(), 1);
    Ok(())
}
