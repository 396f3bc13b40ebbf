// Transport - Playback state and tick clock
// Owns the running counter and decides when the next tick is due

use super::SequencerError;
use super::metronome::{TickType, beat_number, classify};
use super::timeline::TickParameters;
use std::time::{Duration, Instant};

/// Transport state (play/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// One fired tick, as handed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    /// Counter value of this tick (0 for the first tick after start)
    pub counter: u64,
    /// 1-indexed beat within the measure
    pub beat: u32,
    pub tick_type: TickType,
    /// Instant the tick was actually processed
    pub timestamp: Instant,
}

/// Tick clock
///
/// Pure state machine driven by explicit instants, so the scheduling rules
/// can be exercised without sleeping. The scheduler thread feeds it
/// `Instant::now()`.
///
/// The anchor (`last_tick_at`) is the scheduled instant of the last tick, not
/// the instant it was processed (`TickEvent::timestamp`). Recording the
/// processing instant would push every later tick back by that tick's
/// lateness; anchoring on the schedule keeps lateness from accumulating into
/// drift. Both agree whenever a tick is handled on time.
/// If processing falls more than one full period behind, the clock re-anchors
/// on the late tick instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct TickClock {
    params: TickParameters,
    period: Duration,
    state: TransportState,
    counter: u64,
    last_tick_at: Option<Instant>,
    next_tick_at: Option<Instant>,
    ticks_fired: bool,
}

impl TickClock {
    /// Create a stopped clock
    pub fn new(params: TickParameters) -> Result<Self, SequencerError> {
        let period = params.period()?;
        Ok(Self {
            params,
            period,
            state: TransportState::Stopped,
            counter: 0,
            last_tick_at: None,
            next_tick_at: None,
            ticks_fired: false,
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn parameters(&self) -> TickParameters {
        self.params
    }

    /// Current tick spacing
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Counter value the next tick will carry
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Anchor of the schedule: the last tick, or the start instant
    pub fn last_tick_at(&self) -> Option<Instant> {
        self.last_tick_at
    }

    /// When the next tick is due, `None` while stopped
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick_at
    }

    /// Start playback; the first tick is due immediately
    pub fn start(&mut self, now: Instant) -> Result<(), SequencerError> {
        if self.state.is_playing() {
            return Err(SequencerError::AlreadyPlaying);
        }

        self.state = TransportState::Playing;
        self.counter = 0;
        self.last_tick_at = Some(now);
        self.next_tick_at = Some(now);
        self.ticks_fired = false;
        Ok(())
    }

    /// Stop playback and reset the counter
    /// Returns false if the clock was already stopped
    pub fn stop(&mut self) -> bool {
        let was_playing = self.state.is_playing();

        self.state = TransportState::Stopped;
        self.counter = 0;
        self.last_tick_at = None;
        self.next_tick_at = None;
        self.ticks_fired = false;

        was_playing
    }

    /// Install new parameters
    ///
    /// Invalid parameters are rejected and the current schedule is kept.
    /// While playing, the next tick moves to one new period after the last
    /// tick. A first tick that has not fired yet stays due at the start
    /// instant.
    pub fn set_parameters(&mut self, params: TickParameters) -> Result<(), SequencerError> {
        let period = params.period()?;

        self.params = params;
        self.period = period;

        if self.state.is_playing() && self.ticks_fired {
            self.next_tick_at = self.last_tick_at.map(|anchor| anchor + period);
        }
        Ok(())
    }

    /// Fire the pending tick if it is due at `now`
    pub fn poll(&mut self, now: Instant) -> Option<TickEvent> {
        match self.next_tick_at {
            Some(deadline) if now >= deadline => self.fire(now),
            _ => None,
        }
    }

    /// Fire the pending tick unconditionally
    /// Returns None while stopped
    pub fn fire(&mut self, now: Instant) -> Option<TickEvent> {
        let scheduled = self.next_tick_at?;

        let meter = self.params.meter;
        let event = TickEvent {
            counter: self.counter,
            beat: beat_number(self.counter, &meter),
            tick_type: classify(self.counter, &meter),
            timestamp: now,
        };

        let mut anchor = scheduled;
        if now.saturating_duration_since(scheduled) > self.period {
            log::warn!(
                "Tick {} processed {:?} late, re-anchoring schedule",
                self.counter,
                now.saturating_duration_since(scheduled)
            );
            anchor = now;
        }

        self.last_tick_at = Some(anchor);
        self.next_tick_at = Some(anchor + self.period);
        self.ticks_fired = true;
        self.counter += 1;

        Some(event)
    }
}
