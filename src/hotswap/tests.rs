use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::*;
use crate::dsp::EntryPoints;

thread_local! {
    static EVENTS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static READY: Cell<bool> = const { Cell::new(false) };
}

fn events() -> Vec<&'static str> {
    EVENTS.with(|events| events.borrow().clone())
}

unsafe fn fill(outputs: *const *mut f32, channels: u32, frames: u32, value: f32) {
    for channel in 0..channels as usize {
        let out = unsafe { std::slice::from_raw_parts_mut(*outputs.add(channel), frames as usize) };
        out.fill(value);
    }
}

unsafe extern "C" fn tag_one(_: *const *const f32, outputs: *const *mut f32, channels: u32, frames: u32) {
    let value = if READY.get() { 1.0 } else { 0.0 };
    unsafe { fill(outputs, channels, frames, value) }
}

unsafe extern "C" fn tag_two(_: *const *const f32, outputs: *const *mut f32, channels: u32, frames: u32) {
    let value = if READY.get() { 2.0 } else { 0.0 };
    unsafe { fill(outputs, channels, frames, value) }
}

unsafe extern "C" fn setup_one(_: f64, _: u32, _: u32) -> bool {
    EVENTS.with(|events| events.borrow_mut().push("setup one"));
    READY.set(true);
    true
}

unsafe extern "C" fn teardown_one() {
    EVENTS.with(|events| events.borrow_mut().push("teardown one"));
    READY.set(false);
}

unsafe extern "C" fn setup_two(_: f64, _: u32, _: u32) -> bool {
    EVENTS.with(|events| events.borrow_mut().push("setup two"));
    READY.set(true);
    true
}

unsafe extern "C" fn teardown_two() {
    EVENTS.with(|events| events.borrow_mut().push("teardown two"));
    READY.set(false);
}

unsafe extern "C" fn refuse_setup(_: f64, _: u32, _: u32) -> bool {
    false
}

fn plain(process: crate::dsp::entry::ProcessFn, generation: u64) -> Binding {
    unsafe {
        Binding::new(
            EntryPoints {
                process,
                setup: None,
                teardown: None,
            },
            generation,
        )
    }
}

fn with_hooks(two: bool, generation: u64) -> Binding {
    let entries = if two {
        EntryPoints {
            process: tag_two,
            setup: Some(setup_two),
            teardown: Some(teardown_two),
        }
    } else {
        EntryPoints {
            process: tag_one,
            setup: Some(setup_one),
            teardown: Some(teardown_one),
        }
    };
    unsafe { Binding::new(entries, generation) }
}

fn run_block(processor: &mut Processor) -> Vec<f32> {
    let input = [0.0f32; 16];
    let mut left = [9.0f32; 16];
    let mut right = [9.0f32; 16];
    {
        let inputs: [&[f32]; 2] = [&input, &input];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
        processor.process(&inputs, &mut outputs);
    }
    let mut block = left.to_vec();
    block.extend_from_slice(&right);
    block
}

#[test]
fn staged_binding_is_adopted_at_next_block() {
    READY.set(true);
    let (publisher, mut processor) = channel(plain(tag_one, 1));
    assert!(run_block(&mut processor).iter().all(|&s| s == 1.0));

    let ticket = publisher.begin();
    assert_eq!(ticket.generation(), 2);
    assert_eq!(publisher.state(), SwapState::Compiling);
    assert_eq!(publisher.stage(ticket, plain(tag_two, 2)), StageOutcome::Staged);
    assert_eq!(publisher.state(), SwapState::SwapReady);

    assert!(run_block(&mut processor).iter().all(|&s| s == 2.0));
    assert_eq!(processor.generation(), 2);
    assert_eq!(publisher.active_generation(), 2);
    assert_eq!(publisher.swaps(), 1);
    assert_eq!(publisher.state(), SwapState::Stable);
    assert_eq!(publisher.collect_retired(), 1);
}

#[test]
fn swap_runs_old_teardown_then_new_setup() {
    EVENTS.with(|events| events.borrow_mut().clear());
    let (publisher, mut processor) = channel(with_hooks(false, 1));
    assert!(processor.activate(48_000.0, 32, 512));

    let ticket = publisher.begin();
    publisher.stage(ticket, with_hooks(true, 2));
    assert!(run_block(&mut processor).iter().all(|&s| s == 2.0));
    assert!(publisher.last_setup_ok());

    processor.deactivate();
    assert_eq!(
        events(),
        ["setup one", "teardown one", "setup two", "teardown two"]
    );
}

#[test]
fn inactive_processor_swaps_without_hooks() {
    EVENTS.with(|events| events.borrow_mut().clear());
    let (publisher, mut processor) = channel(with_hooks(false, 1));
    let ticket = publisher.begin();
    publisher.stage(ticket, with_hooks(true, 2));
    assert!(processor.poll_swap());
    assert!(events().is_empty());
    assert!(!processor.is_activated());
}

#[test]
fn failed_setup_leaves_processor_inactive() {
    let binding = unsafe {
        Binding::new(
            EntryPoints {
                process: tag_one,
                setup: Some(refuse_setup),
                teardown: None,
            },
            1,
        )
    };
    let (publisher, mut processor) = channel(binding);
    assert!(!processor.activate(44_100.0, 1, 64));
    assert!(!processor.is_activated());
    assert!(!publisher.last_setup_ok());
}

#[test]
fn older_compile_is_superseded() {
    let (publisher, mut processor) = channel(plain(tag_one, 1));
    let slow = publisher.begin();
    let fast = publisher.begin();
    assert_eq!(publisher.stage(fast, plain(tag_two, 3)), StageOutcome::Staged);
    assert_eq!(publisher.stage(slow, plain(tag_one, 2)), StageOutcome::Superseded);
    assert_eq!(publisher.state(), SwapState::SwapReady);

    processor.poll_swap();
    assert_eq!(processor.generation(), 3);
}

#[test]
fn unclaimed_binding_is_replaced() {
    let (publisher, mut processor) = channel(plain(tag_one, 1));
    let first = publisher.begin();
    let second = publisher.begin();
    publisher.stage(first, plain(tag_one, 2));
    publisher.stage(second, plain(tag_two, 3));
    assert!(processor.poll_swap());
    assert!(!processor.poll_swap());
    assert_eq!(processor.generation(), 3);
    assert_eq!(processor.swaps(), 1);
}

#[test]
fn abandoned_compile_keeps_active_binding() {
    let (publisher, mut processor) = channel(plain(tag_one, 1));
    let ticket = publisher.begin();
    publisher.abandon(ticket);
    assert_eq!(publisher.state(), SwapState::Stable);
    assert!(!processor.poll_swap());
    assert_eq!(processor.generation(), 1);
}

#[test]
fn full_retire_channel_postpones_swap() {
    let shared = Arc::new(SwapShared::new(1));
    let mut processor = Processor::new(Arc::clone(&shared), Box::new(plain(tag_one, 1)));
    for generation in 0..RETIRE_CAPACITY as u64 {
        shared
            .retire_tx
            .try_send(Box::new(plain(tag_one, 100 + generation)))
            .unwrap();
    }

    shared
        .pending
        .store(Box::into_raw(Box::new(plain(tag_two, 2))), Ordering::Release);
    assert!(processor.poll_swap(), "swap proceeds; old binding is parked");
    assert_eq!(processor.generation(), 2);

    shared
        .pending
        .store(Box::into_raw(Box::new(plain(tag_one, 3))), Ordering::Release);
    assert!(!processor.poll_swap(), "parked binding blocks the next swap");
    assert_eq!(processor.generation(), 2);

    while shared.retire_rx.try_recv().is_ok() {}
    assert!(processor.poll_swap());
    assert_eq!(processor.generation(), 3);
    assert_eq!(shared.retire_rx.len(), 2);
}

#[test]
fn concurrent_stages_never_mix_bindings() {
    let (publisher, mut processor) = channel(with_hooks(false, 1));
    let done = Arc::new(AtomicBool::new(false));

    let audio = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            assert!(processor.activate(48_000.0, 16, 16));
            let mut blocks = 0usize;
            while !done.load(Ordering::Acquire) || blocks < 100 {
                let block = run_block(&mut processor);
                let first = block[0];
                assert!(first == 1.0 || first == 2.0, "uninitialised block: {first}");
                assert!(block.iter().all(|&s| s == first), "mixed block");
                blocks += 1;
            }
            processor.deactivate();
            processor.swaps()
        })
    };

    for round in 0..200u64 {
        let ticket = publisher.begin();
        publisher.stage(ticket, with_hooks(round % 2 == 0, round + 2));
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    let swaps = audio.join().expect("audio thread panicked");
    assert!(swaps >= 1);
    publisher.collect_retired();
}
