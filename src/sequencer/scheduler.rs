// Scheduler - Worker thread driving the tick clock
// One thread owns the only timer; every tick is processed on it, in order

use super::SequencerError;
use super::timeline::TickParameters;
use super::transport::{TickClock, TickEvent, TransportState};
use crate::settings::{SettingsStore, SubscriptionId};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

/// Error type a tick listener may report
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every fired tick on the scheduler thread
///
/// Listeners must hand heavy work (audio, drawing) off to other threads.
/// An error or a panic only affects the tick being delivered.
pub trait TickListener: Send {
    fn on_tick(&mut self, event: &TickEvent) -> Result<(), ListenerError>;
}

impl<F> TickListener for F
where
    F: FnMut(&TickEvent) -> Result<(), ListenerError> + Send,
{
    fn on_tick(&mut self, event: &TickEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

struct SchedulerState {
    clock: TickClock,
    shutdown: bool,
    /// A fired tick is being handed to the listener
    delivering: bool,
}

struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    /// Signalled when a delivery finishes
    delivered: Condvar,
    faults: AtomicU64,
    worker_id: OnceLock<ThreadId>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no tick is being delivered
    ///
    /// Returns at once on the worker itself, where the listener is the caller.
    fn wait_for_delivery<'a>(
        &self,
        mut state: MutexGuard<'a, SchedulerState>,
    ) -> MutexGuard<'a, SchedulerState> {
        if self.worker_id.get() == Some(&thread::current().id()) {
            return state;
        }
        while state.delivering {
            state = self
                .delivered
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

/// Cloneable control surface of a running scheduler
///
/// Safe to use from any thread, including from settings callbacks.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Start playback from tick 0
    pub fn start(&self) -> Result<(), SequencerError> {
        let mut state = self.shared.lock();
        state.clock.start(Instant::now())?;
        log::info!("Metronome started at {}", state.clock.parameters());
        drop(state);

        self.shared.wake.notify_all();
        Ok(())
    }

    /// Stop playback; calling it while stopped does nothing
    ///
    /// A tick that fired before the stop may still be in the listener; this
    /// waits for it, so no listener call happens once `stop` returns.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if state.clock.stop() {
            log::info!("Metronome stopped");
        } else {
            log::debug!("Stop requested while already stopped");
        }
        let state = self.shared.wait_for_delivery(state);
        drop(state);

        self.shared.wake.notify_all();
    }

    /// Start when stopped, stop when playing
    pub fn toggle(&self) -> Result<TransportState, SequencerError> {
        if self.state().is_playing() {
            self.stop();
            Ok(TransportState::Stopped)
        } else {
            self.start()?;
            Ok(TransportState::Playing)
        }
    }

    /// Swap in new tempo/meter parameters
    ///
    /// The old schedule is replaced under the scheduler lock, so there is
    /// never more than one pending deadline.
    pub fn set_parameters(&self, params: TickParameters) -> Result<(), SequencerError> {
        let mut state = self.shared.lock();
        if state.clock.parameters() == params {
            return Ok(());
        }
        state.clock.set_parameters(params)?;
        log::debug!(
            "Schedule swapped to {}, next tick at {:?}",
            params,
            state.clock.next_deadline()
        );
        drop(state);

        self.shared.wake.notify_all();
        Ok(())
    }

    pub fn state(&self) -> TransportState {
        self.shared.lock().clock.state()
    }

    pub fn parameters(&self) -> TickParameters {
        self.shared.lock().clock.parameters()
    }

    /// Counter value the next tick will carry
    pub fn counter(&self) -> u64 {
        self.shared.lock().clock.counter()
    }

    /// Whether a tick deadline is currently armed
    pub fn has_pending_tick(&self) -> bool {
        self.shared.lock().clock.next_deadline().is_some()
    }

    /// Number of ticks whose listener failed or panicked
    pub fn fault_count(&self) -> u64 {
        self.shared.faults.load(Ordering::Relaxed)
    }

    /// Keep the schedule in line with a settings store
    ///
    /// Tempo and meter edits (and reloads) are forwarded as new parameters;
    /// other edits are ignored. Drop the link with `store.unsubscribe(id)`.
    pub fn follow(&self, store: &mut SettingsStore) -> SubscriptionId {
        let handle = self.clone();
        store.subscribe(move |settings, change| {
            if !change.affects_schedule() {
                return;
            }
            let applied = settings
                .tick_parameters()
                .and_then(|params| handle.set_parameters(params));
            if let Err(e) = applied {
                log::error!("Settings rejected by the scheduler: {}", e);
            }
        })
    }
}

/// Tick scheduler
///
/// Constructed once; owns its worker thread until dropped.
pub struct TickScheduler {
    handle: SchedulerHandle,
    worker: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Spawn the scheduler thread in the stopped state
    pub fn new(
        params: TickParameters,
        listener: Box<dyn TickListener>,
    ) -> Result<Self, SequencerError> {
        let clock = TickClock::new(params)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                clock,
                shutdown: false,
                delivering: false,
            }),
            wake: Condvar::new(),
            delivered: Condvar::new(),
            faults: AtomicU64::new(0),
            worker_id: OnceLock::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || run_worker(worker_shared, listener))
            .map_err(SequencerError::Spawn)?;

        Ok(Self {
            handle: SchedulerHandle { shared },
            worker: Some(worker),
        })
    }

    /// Cloneable handle for other threads
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }
}

impl std::ops::Deref for TickScheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.handle.shared.lock();
            state.clock.stop();
            state.shutdown = true;
        }
        self.handle.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Scheduler thread panicked during shutdown");
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>, mut listener: Box<dyn TickListener>) {
    let _ = shared.worker_id.set(thread::current().id());
    let mut state = shared.lock();

    loop {
        if state.shutdown {
            break;
        }

        let Some(deadline) = state.clock.next_deadline() else {
            state = shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let now = Instant::now();
        if now < deadline {
            // Woken early by a start/stop/parameter change: re-read the deadline
            state = shared
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        let Some(event) = state.clock.fire(now) else {
            continue;
        };

        // Deliver outside the lock; only stop() waits for it
        state.delivering = true;
        drop(state);
        deliver(&shared, listener.as_mut(), &event);
        state = shared.lock();
        state.delivering = false;
        shared.delivered.notify_all();
    }

    log::debug!("Scheduler thread exiting");
}

fn deliver(shared: &Shared, listener: &mut dyn TickListener, event: &TickEvent) {
    match catch_unwind(AssertUnwindSafe(|| listener.on_tick(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            shared.faults.fetch_add(1, Ordering::Relaxed);
            log::error!("Tick {} listener failed: {}", event.counter, e);
        }
        Err(_) => {
            shared.faults.fetch_add(1, Ordering::Relaxed);
            log::error!("Tick {} listener panicked", event.counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn params(tempo: u32, beats: u32, subdivisions: u32) -> TickParameters {
        TickParameters::new(tempo, beats, subdivisions).unwrap()
    }

    fn channel_listener() -> (Box<dyn TickListener>, mpsc::Receiver<TickEvent>) {
        let (tx, rx) = mpsc::channel();
        let listener = move |event: &TickEvent| -> Result<(), ListenerError> {
            tx.send(*event)?;
            Ok(())
        };
        (Box::new(listener), rx)
    }

    #[test]
    fn test_scheduler_starts_stopped() {
        let (listener, rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();

        assert_eq!(scheduler.state(), TransportState::Stopped);
        assert!(!scheduler.has_pending_tick());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_first_tick_is_immediate() {
        let (listener, rx) = channel_listener();
        let scheduler = TickScheduler::new(params(60, 4, 1), listener).unwrap();

        scheduler.start().unwrap();
        let event = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(event.counter, 0);
        assert_eq!(event.beat, 1);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (listener, _rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();

        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(SequencerError::AlreadyPlaying)
        ));
        assert_eq!(scheduler.state(), TransportState::Playing);
    }

    #[test]
    fn test_start_stop_leaves_nothing_armed() {
        let (listener, _rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();

        scheduler.start().unwrap();
        scheduler.stop();

        assert_eq!(scheduler.state(), TransportState::Stopped);
        assert_eq!(scheduler.counter(), 0);
        assert!(!scheduler.has_pending_tick());

        scheduler.stop();
        assert_eq!(scheduler.counter(), 0);
        assert!(!scheduler.has_pending_tick());
    }

    #[test]
    fn test_toggle() {
        let (listener, _rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();

        assert_eq!(scheduler.toggle().unwrap(), TransportState::Playing);
        assert_eq!(scheduler.toggle().unwrap(), TransportState::Stopped);
    }

    #[test]
    fn test_failing_listener_keeps_ticking() {
        let (tx, rx) = mpsc::channel();
        let listener = move |event: &TickEvent| -> Result<(), ListenerError> {
            tx.send(event.counter)?;
            if event.counter == 0 {
                return Err("sound device busy".into());
            }
            if event.counter == 1 {
                panic!("flash failed");
            }
            Ok(())
        };

        // 600 BPM = 100ms per tick
        let scheduler = TickScheduler::new(params(600, 4, 1), Box::new(listener)).unwrap();
        scheduler.start().unwrap();

        let counters: Vec<u64> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(counters, vec![0, 1, 2]);
        assert_eq!(scheduler.fault_count(), 2);
        assert_eq!(scheduler.state(), TransportState::Playing);
    }

    #[test]
    fn test_no_delivery_after_stop_returns() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let finished = Arc::new(AtomicU64::new(0));
        let listener = {
            let finished = Arc::clone(&finished);
            move |event: &TickEvent| -> Result<(), ListenerError> {
                entered_tx.send(event.counter)?;
                thread::sleep(Duration::from_millis(100));
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let scheduler = TickScheduler::new(params(60, 4, 1), Box::new(listener)).unwrap();

        scheduler.start().unwrap();
        // Stop while tick 0 is still inside the listener
        assert_eq!(entered_rx.recv_timeout(Duration::from_secs(1)).unwrap(), 0);
        scheduler.stop();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(entered_rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_stop_from_listener_does_not_block() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<SchedulerHandle>>> = Arc::new(Mutex::new(None));
        let listener = {
            let slot = Arc::clone(&slot);
            move |event: &TickEvent| -> Result<(), ListenerError> {
                if let Some(handle) = slot.lock().unwrap().as_ref() {
                    handle.stop();
                }
                tx.send(event.counter)?;
                Ok(())
            }
        };
        let scheduler = TickScheduler::new(params(600, 4, 1), Box::new(listener)).unwrap();
        *slot.lock().unwrap() = Some(scheduler.handle());

        scheduler.start().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(scheduler.state(), TransportState::Stopped);
    }

    #[test]
    fn test_follow_forwards_schedule_edits() {
        let (listener, _rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();
        let mut store = SettingsStore::default();

        let id = scheduler.follow(&mut store);
        store.set_tempo(90).unwrap();
        store.set_beats(3).unwrap();
        store.set_emphasize_first_beat(false).unwrap();
        assert_eq!(scheduler.parameters(), params(90, 3, 1));

        assert!(store.unsubscribe(id));
        store.set_tempo(200).unwrap();
        assert_eq!(scheduler.parameters().tempo.bpm(), 90);
    }

    #[test]
    fn test_unchanged_parameters_are_ignored() {
        let (listener, _rx) = channel_listener();
        let scheduler = TickScheduler::new(params(120, 4, 1), listener).unwrap();

        scheduler.set_parameters(params(120, 4, 1)).unwrap();
        assert_eq!(scheduler.parameters(), params(120, 4, 1));

        scheduler.set_parameters(params(90, 3, 1)).unwrap();
        assert_eq!(scheduler.parameters().tempo.bpm(), 90);
    }

    #[test]
    fn test_drop_joins_worker() {
        let (listener, rx) = channel_listener();
        let scheduler = TickScheduler::new(params(600, 4, 1), listener).unwrap();
        scheduler.start().unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        drop(scheduler);

        // Listener (and its sender) was dropped with the worker
        while rx.try_recv().is_ok() {}
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(300)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }
}
