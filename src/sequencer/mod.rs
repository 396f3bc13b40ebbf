// Sequencer module
// Tempo maths, tick classification, tick clock and the scheduler thread

pub mod metronome;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use metronome::{ClickSound, Metronome, MetronomeSound, TickType, beat_number, classify};
pub use scheduler::{ListenerError, SchedulerHandle, TickListener, TickScheduler};
pub use timeline::{Meter, TickParameters, Tempo, period_ms};
pub use transport::{TickClock, TickEvent, TransportState};

/// Sequencer error types
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("Invalid {name}: {value} (must be positive)")]
    InvalidParameter { name: &'static str, value: u32 },

    #[error("Tick period rounds to zero at {tempo} BPM with {subdivisions} subdivisions")]
    PeriodTooShort { tempo: u32, subdivisions: u32 },

    #[error("Metronome is already playing")]
    AlreadyPlaying,

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}
