// Integration test: scheduler timing on a real clock
//
// These run the worker thread against wall-clock time, so the tolerances
// are generous. Exact instants are covered by the TickClock unit tests.

use mymusic_metronome::sequencer::ListenerError;
use mymusic_metronome::{
    SettingsStore, TickEvent, TickParameters, TickScheduler, TickType, TransportState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn params(tempo: u32, beats: u32, subdivisions: u32) -> TickParameters {
    TickParameters::new(tempo, beats, subdivisions).unwrap()
}

fn scheduler_with_channel(
    params: TickParameters,
) -> (TickScheduler, mpsc::Receiver<TickEvent>) {
    let (tx, rx) = mpsc::channel();
    let listener = move |event: &TickEvent| -> Result<(), ListenerError> {
        tx.send(*event)?;
        Ok(())
    };
    let scheduler = TickScheduler::new(params, Box::new(listener)).unwrap();
    (scheduler, rx)
}

fn next(rx: &mpsc::Receiver<TickEvent>) -> TickEvent {
    rx.recv_timeout(Duration::from_secs(3))
        .expect("tick did not arrive in time")
}

#[test]
fn test_ticks_arrive_at_tempo_in_order() {
    // 600 BPM = 100ms per tick
    let (scheduler, rx) = scheduler_with_channel(params(600, 4, 1));
    scheduler.start().unwrap();

    let events: Vec<TickEvent> = (0..6).map(|_| next(&rx)).collect();
    scheduler.stop();

    let counters: Vec<u64> = events.iter().map(|e| e.counter).collect();
    assert_eq!(counters, vec![0, 1, 2, 3, 4, 5]);

    let span = events[5].timestamp - events[0].timestamp;
    println!("5 intervals took {:?}", span);
    assert!(span >= Duration::from_millis(480), "too fast: {:?}", span);
    assert!(span <= Duration::from_millis(800), "too slow: {:?}", span);
}

#[test]
fn test_classification_sequence_four_by_two() {
    // 300 BPM x 2 subdivisions = 100ms per tick
    let (scheduler, rx) = scheduler_with_channel(params(300, 4, 2));
    scheduler.start().unwrap();

    let events: Vec<TickEvent> = (0..8).map(|_| next(&rx)).collect();
    scheduler.stop();

    let types: Vec<TickType> = events.iter().map(|e| e.tick_type).collect();
    assert_eq!(
        types,
        vec![
            TickType::Strong,
            TickType::Sub,
            TickType::Weak,
            TickType::Sub,
            TickType::Weak,
            TickType::Sub,
            TickType::Weak,
            TickType::Sub,
        ]
    );

    let beats: Vec<u32> = events.iter().map(|e| e.beat).collect();
    assert_eq!(beats, vec![1, 1, 2, 2, 3, 3, 4, 4]);
}

#[test]
fn test_tempo_change_lands_one_new_period_after_last_tick() {
    // 60 BPM = 1000ms per tick
    let (scheduler, rx) = scheduler_with_channel(params(60, 4, 1));
    scheduler.start().unwrap();
    let first = next(&rx);

    thread::sleep(Duration::from_millis(200));
    // Doubling the tempo: next tick due 500ms after the first one
    scheduler.set_parameters(params(120, 4, 1)).unwrap();

    let second = next(&rx);
    scheduler.stop();

    let gap = second.timestamp - first.timestamp;
    println!("tick after tempo change came {:?} after the last tick", gap);
    assert_eq!(second.counter, 1);
    assert!(gap >= Duration::from_millis(480), "fired early: {:?}", gap);
    assert!(gap < Duration::from_millis(900), "kept old period: {:?}", gap);
}

#[test]
fn test_stop_silences_and_restart_counts_from_zero() {
    let (scheduler, rx) = scheduler_with_channel(params(600, 4, 1));

    scheduler.start().unwrap();
    next(&rx);
    next(&rx);
    scheduler.stop();
    scheduler.stop();

    assert_eq!(scheduler.state(), TransportState::Stopped);
    assert_eq!(scheduler.counter(), 0);
    assert!(!scheduler.has_pending_tick());

    // Drain anything already in flight, then expect silence
    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    scheduler.start().unwrap();
    assert_eq!(next(&rx).counter, 0);
}

#[test]
fn test_tick_handling_never_overlaps() {
    let in_flight = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let listener = {
        let in_flight = Arc::clone(&in_flight);
        let overlapped = Arc::clone(&overlapped);
        move |event: &TickEvent| -> Result<(), ListenerError> {
            if in_flight.swap(true, Ordering::SeqCst) {
                overlapped.store(true, Ordering::SeqCst);
            }
            // Slower than the 62ms tick period
            thread::sleep(Duration::from_millis(80));
            in_flight.store(false, Ordering::SeqCst);
            tx.send(event.counter)?;
            Ok(())
        }
    };

    // 240 BPM x 4 subdivisions = 62ms per tick
    let scheduler = TickScheduler::new(params(240, 4, 4), Box::new(listener)).unwrap();
    scheduler.start().unwrap();

    let counters: Vec<u64> = (0..6)
        .map(|_| rx.recv_timeout(Duration::from_secs(3)).unwrap())
        .collect();
    scheduler.stop();

    assert_eq!(counters, vec![0, 1, 2, 3, 4, 5]);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn test_settings_edits_reach_running_schedule() {
    let (scheduler, _rx) = scheduler_with_channel(params(120, 4, 1));
    let mut store = SettingsStore::default();

    scheduler.follow(&mut store);

    scheduler.start().unwrap();
    store.set_tempo(90).unwrap();
    store.set_subdivisions(3).unwrap();
    store.set_emphasize_first_beat(false).unwrap();

    let current = scheduler.parameters();
    assert_eq!(current.tempo.bpm(), 90);
    assert_eq!(current.meter.subdivisions(), 3);
    assert_eq!(current.period().unwrap(), Duration::from_millis(222));
    assert_eq!(scheduler.state(), TransportState::Playing);
}

#[test]
fn test_followed_tempo_change_reanchors_running_schedule() {
    // 60 BPM = 1000ms per tick
    let (scheduler, rx) = scheduler_with_channel(params(60, 4, 1));
    let mut store = SettingsStore::default();
    store.set_tempo(60).unwrap();
    scheduler.follow(&mut store);

    scheduler.start().unwrap();
    let first = next(&rx);
    store.set_tempo(120).unwrap();

    let second = next(&rx);
    scheduler.stop();

    let gap = second.timestamp - first.timestamp;
    assert!(gap >= Duration::from_millis(480), "fired early: {:?}", gap);
    assert!(gap < Duration::from_millis(900), "kept old period: {:?}", gap);
}
