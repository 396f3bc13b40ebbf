// MyMusic Metronome - Library exports for the app, tests and benchmarks

pub mod audio;
pub mod messaging;
pub mod sequencer;
pub mod settings;
pub mod ui;

// Re-export commonly used types for convenience
pub use audio::engine::AudioEngine;
pub use messaging::channels::{create_command_channel, create_cue_channel};
pub use sequencer::{
    ClickSound, Meter, Metronome, SchedulerHandle, SequencerError, TickClock, TickEvent,
    TickListener, TickParameters, TickScheduler, TickType, Tempo, TransportState, beat_number,
    classify, period_ms,
};
pub use settings::{MetronomeSettings, SettingsChange, SettingsError, SettingsStore};
pub use ui::cue::{Cue, CueDispatcher};
