// Settings module
// Persisted metronome configuration with change notification

pub mod serialization;
pub mod store;
pub mod types;

pub use serialization::{SETTINGS_FILE_NAME, SettingsFile, default_settings_path};
pub use store::{SettingsStore, SharedSettings, SubscriptionId};
pub use types::{
    BEATS_RANGE, MetronomeSettings, SUBDIVISIONS_RANGE, SettingsChange, TEMPO_RANGE,
};

/// Settings error types
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{name} {value} is out of range ({min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Gap beat {beat} is outside the measure (1..={beats})")]
    GapOutOfRange { beat: u32, beats: u32 },

    #[error("Unsupported settings format version: {0}")]
    UnsupportedVersion(u32),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
