// Timeline - Tempo, meter and tick period maths
// Converts musical parameters into the wall-clock spacing between ticks

use super::SequencerError;
use std::fmt;
use std::time::Duration;

/// Milliseconds in one minute
pub const MS_PER_MINUTE: u64 = 60_000;

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be > 0; the upper bound belongs to the settings layer
    pub fn new(bpm: u32) -> Result<Self, SequencerError> {
        if bpm == 0 {
            return Err(SequencerError::InvalidParameter {
                name: "tempo",
                value: 0,
            });
        }
        Ok(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Duration of one beat
    pub fn beat_duration(&self) -> Duration {
        Duration::from_millis(MS_PER_MINUTE / self.bpm as u64)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120 }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}

/// Meter: beats per measure and sub-ticks per beat
/// Example: 4 beats with 2 subdivisions = eighth notes in 4/4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Meter {
    beats: u32,
    subdivisions: u32,
}

impl Meter {
    /// Creates a new meter, both counts must be >= 1
    pub fn new(beats: u32, subdivisions: u32) -> Result<Self, SequencerError> {
        if beats == 0 {
            return Err(SequencerError::InvalidParameter {
                name: "beats",
                value: 0,
            });
        }
        if subdivisions == 0 {
            return Err(SequencerError::InvalidParameter {
                name: "subdivisions",
                value: 0,
            });
        }
        Ok(Self {
            beats,
            subdivisions,
        })
    }

    /// Number of beats per measure
    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Number of ticks per beat
    pub fn subdivisions(&self) -> u32 {
        self.subdivisions
    }

    /// Number of ticks in one full measure
    pub fn ticks_per_measure(&self) -> u64 {
        self.beats as u64 * self.subdivisions as u64
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats: 4,
            subdivisions: 1,
        }
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.beats, self.subdivisions)
    }
}

/// Tick period in whole milliseconds: `60000 / (tempo * subdivisions)`
///
/// Division truncates toward zero. A product above 60000 would give a zero
/// period and is rejected, as are zero operands.
pub fn period_ms(tempo: u32, subdivisions: u32) -> Result<u64, SequencerError> {
    if tempo == 0 {
        return Err(SequencerError::InvalidParameter {
            name: "tempo",
            value: 0,
        });
    }
    if subdivisions == 0 {
        return Err(SequencerError::InvalidParameter {
            name: "subdivisions",
            value: 0,
        });
    }

    let period = MS_PER_MINUTE / (tempo as u64 * subdivisions as u64);
    if period == 0 {
        return Err(SequencerError::PeriodTooShort {
            tempo,
            subdivisions,
        });
    }
    Ok(period)
}

/// Everything the tick clock needs to know about the current pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TickParameters {
    pub tempo: Tempo,
    pub meter: Meter,
}

impl TickParameters {
    /// Build from raw integers, validating each one
    pub fn new(tempo: u32, beats: u32, subdivisions: u32) -> Result<Self, SequencerError> {
        let params = Self {
            tempo: Tempo::new(tempo)?,
            meter: Meter::new(beats, subdivisions)?,
        };
        // Reject parameters that cannot be scheduled at all
        params.period()?;
        Ok(params)
    }

    /// Spacing between two consecutive ticks
    pub fn period(&self) -> Result<Duration, SequencerError> {
        period_ms(self.tempo.bpm(), self.meter.subdivisions()).map(Duration::from_millis)
    }
}

impl fmt::Display for TickParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tempo, self.meter)
    }
}
