// Cues - What to play and flash for a tick
// Bridges the scheduler thread to the audio engine and the screen

use crate::messaging::channels::{CommandProducer, CueProducer};
use crate::messaging::command::Command;
use crate::sequencer::{ClickSound, ListenerError, TickEvent, TickListener, TickType};
use crate::settings::{MetronomeSettings, SharedSettings};
use ringbuf::traits::Producer;
use std::sync::PoisonError;
use std::time::Instant;

/// Presentation of one audible tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cue {
    pub counter: u64,
    /// 1-indexed beat whose indicator lights up
    pub beat: u32,
    pub sound: ClickSound,
    pub at: Instant,
}

impl Cue {
    /// Decide how a tick is presented
    ///
    /// Every tick of a gap beat is silent and dark, so this returns None.
    /// The downbeat only gets the strong click when emphasis is on.
    pub fn for_tick(event: &TickEvent, settings: &MetronomeSettings) -> Option<Self> {
        if settings.is_gap(event.beat) {
            return None;
        }

        let sound = match event.tick_type {
            TickType::Strong if !settings.emphasize_first_beat => ClickSound::Weak,
            other => ClickSound::from(other),
        };

        Some(Self {
            counter: event.counter,
            beat: event.beat,
            sound,
            at: event.timestamp,
        })
    }

    /// Sub-ticks click but do not flash the beat indicator
    pub fn flashes(&self) -> bool {
        self.sound != ClickSound::Sub
    }
}

/// Tick listener that fans cues out to audio and UI
///
/// Both outputs are fire-and-forget ring buffers. A full audio queue means a
/// lost click and is reported as a fault for that tick. A full UI queue only
/// means the window is not drawing (hidden or minimized), so the flash is
/// dropped silently.
pub struct CueDispatcher {
    settings: SharedSettings,
    audio_tx: Option<CommandProducer>,
    ui_tx: CueProducer,
}

impl CueDispatcher {
    pub fn new(
        settings: SharedSettings,
        audio_tx: Option<CommandProducer>,
        ui_tx: CueProducer,
    ) -> Self {
        Self {
            settings,
            audio_tx,
            ui_tx,
        }
    }
}

impl TickListener for CueDispatcher {
    fn on_tick(&mut self, event: &TickEvent) -> Result<(), ListenerError> {
        let cue = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            Cue::for_tick(event, &settings)
        };
        let Some(cue) = cue else {
            return Ok(());
        };

        let _ = self.ui_tx.try_push(cue);

        if let Some(audio_tx) = self.audio_tx.as_mut() {
            if audio_tx.try_push(Command::Click(cue.sound)).is_err() {
                return Err(format!("click {} dropped, audio queue full", cue.counter).into());
            }
        }
        Ok(())
    }
}
