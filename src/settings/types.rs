// Settings data types
// The persisted metronome configuration and its bounds

use crate::sequencer::{SequencerError, TickParameters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use super::SettingsError;

/// Accepted tempo range in BPM
pub const TEMPO_RANGE: RangeInclusive<u32> = 20..=400;
/// Accepted beats per measure
pub const BEATS_RANGE: RangeInclusive<u32> = 1..=16;
/// Accepted subdivisions per beat
pub const SUBDIVISIONS_RANGE: RangeInclusive<u32> = 1..=8;

/// Metronome settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub beats: u32,
    pub subdivisions: u32,
    pub tempo: u32,
    /// Play the strong click on beat 1 instead of the weak one
    pub emphasize_first_beat: bool,
    /// 1-indexed beats that stay silent and dark
    pub gaps: BTreeSet<u32>,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            beats: 4,
            subdivisions: 1,
            tempo: 120,
            emphasize_first_beat: true,
            gaps: BTreeSet::new(),
        }
    }
}

impl MetronomeSettings {
    /// Check every field against its bounds
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range("tempo", self.tempo, &TEMPO_RANGE)?;
        check_range("beats", self.beats, &BEATS_RANGE)?;
        check_range("subdivisions", self.subdivisions, &SUBDIVISIONS_RANGE)?;

        if let Some(&beat) = self.gaps.iter().find(|&&b| b == 0 || b > self.beats) {
            return Err(SettingsError::GapOutOfRange {
                beat,
                beats: self.beats,
            });
        }
        Ok(())
    }

    /// Clamp every field into range, dropping unusable gaps
    /// Returns true if anything had to change
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();

        self.tempo = self.tempo.clamp(*TEMPO_RANGE.start(), *TEMPO_RANGE.end());
        self.beats = self.beats.clamp(*BEATS_RANGE.start(), *BEATS_RANGE.end());
        self.subdivisions = self
            .subdivisions
            .clamp(*SUBDIVISIONS_RANGE.start(), *SUBDIVISIONS_RANGE.end());
        self.prune_gaps();

        *self != before
    }

    /// Drop gap entries that no longer name a beat of the measure
    pub fn prune_gaps(&mut self) {
        let beats = self.beats;
        self.gaps.retain(|&b| b >= 1 && b <= beats);
    }

    /// Whether the given 1-indexed beat is silenced
    pub fn is_gap(&self, beat: u32) -> bool {
        self.gaps.contains(&beat)
    }

    /// Parameters for the tick scheduler
    pub fn tick_parameters(&self) -> Result<TickParameters, SequencerError> {
        TickParameters::new(self.tempo, self.beats, self.subdivisions)
    }
}

pub(crate) fn check_range(
    name: &'static str,
    value: u32,
    range: &RangeInclusive<u32>,
) -> Result<(), SettingsError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// What part of the settings changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    Beats,
    Subdivisions,
    Tempo,
    EmphasizeFirstBeat,
    Gaps,
    /// Replaced wholesale by a reload from storage
    Reloaded,
}

impl SettingsChange {
    /// Whether the change affects tick timing or classification
    pub fn affects_schedule(&self) -> bool {
        matches!(
            self,
            SettingsChange::Beats
                | SettingsChange::Subdivisions
                | SettingsChange::Tempo
                | SettingsChange::Reloaded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = MetronomeSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.beats, 4);
        assert_eq!(settings.subdivisions, 1);
        assert_eq!(settings.tempo, 120);
        assert!(settings.emphasize_first_beat);
        assert!(settings.gaps.is_empty());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let settings = MetronomeSettings {
            tempo: 500,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::OutOfRange { name: "tempo", .. })
        ));

        let settings = MetronomeSettings {
            subdivisions: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::OutOfRange {
                name: "subdivisions",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_stray_gap() {
        let mut settings = MetronomeSettings::default();
        settings.gaps.insert(5);
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::GapOutOfRange { beat: 5, beats: 4 })
        ));
    }

    #[test]
    fn test_sanitize() {
        let mut settings = MetronomeSettings {
            beats: 40,
            subdivisions: 0,
            tempo: 5,
            emphasize_first_beat: false,
            gaps: [0, 2, 17].into_iter().collect(),
        };

        assert!(settings.sanitize());
        assert_eq!(settings.beats, 16);
        assert_eq!(settings.subdivisions, 1);
        assert_eq!(settings.tempo, 20);
        assert_eq!(settings.gaps.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(settings.validate().is_ok());

        // Already clean
        assert!(!settings.sanitize());
    }

    #[test]
    fn test_tick_parameters() {
        let settings = MetronomeSettings {
            beats: 3,
            subdivisions: 2,
            tempo: 90,
            ..Default::default()
        };
        let params = settings.tick_parameters().unwrap();
        assert_eq!(params.tempo.bpm(), 90);
        assert_eq!(params.meter.beats(), 3);
        assert_eq!(params.meter.subdivisions(), 2);
    }

    #[test]
    fn test_change_kinds() {
        assert!(SettingsChange::Tempo.affects_schedule());
        assert!(SettingsChange::Reloaded.affects_schedule());
        assert!(!SettingsChange::Gaps.affects_schedule());
        assert!(!SettingsChange::EmphasizeFirstBeat.affects_schedule());
    }
}
