// Metronome - Tick classification and click sound generation
// Decides the accent of each tick and renders short click samples for it

use super::timeline::Meter;
use std::f32::consts::PI;

/// Accent classification of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickType {
    /// First sub-tick of the first beat (downbeat)
    Strong,
    /// First sub-tick of any other beat
    Weak,
    /// Any other sub-tick
    Sub,
}

/// Classify the tick at `counter`
///
/// With a single subdivision every tick is either Strong or Weak.
pub fn classify(counter: u64, meter: &Meter) -> TickType {
    let subdivisions = meter.subdivisions() as u64;

    if counter % meter.ticks_per_measure() == 0 {
        TickType::Strong
    } else if counter % subdivisions == 0 {
        TickType::Weak
    } else {
        TickType::Sub
    }
}

/// 1-indexed beat within the measure for the tick at `counter`
pub fn beat_number(counter: u64, meter: &Meter) -> u32 {
    ((counter / meter.subdivisions() as u64) % meter.beats() as u64) as u32 + 1
}

/// Which click sample to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickSound {
    Strong,
    Weak,
    Sub,
}

impl From<TickType> for ClickSound {
    fn from(tick_type: TickType) -> Self {
        match tick_type {
            TickType::Strong => ClickSound::Strong,
            TickType::Weak => ClickSound::Weak,
            TickType::Sub => ClickSound::Sub,
        }
    }
}

/// Metronome click sound generator
/// Pre-generates short click samples for low CPU overhead
#[derive(Debug, Clone)]
pub struct MetronomeSound {
    strong_samples: Vec<f32>,
    weak_samples: Vec<f32>,
    sub_samples: Vec<f32>,
}

impl MetronomeSound {
    /// Duration of click in milliseconds
    const CLICK_DURATION_MS: f32 = 10.0;

    /// Create new metronome sound generator
    pub fn new(sample_rate: f32) -> Self {
        let click_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            strong_samples: Self::generate_click(sample_rate, click_samples, 1200.0, 0.6),
            weak_samples: Self::generate_click(sample_rate, click_samples, 800.0, 0.4),
            sub_samples: Self::generate_click(sample_rate, click_samples, 600.0, 0.25),
        }
    }

    /// Generate a short click sound using sine wave with envelope
    fn generate_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> Vec<f32> {
        let phase_increment = 2.0 * PI * frequency / sample_rate;

        (0..num_samples)
            .map(|i| {
                // Fast exponential decay
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect()
    }

    /// Get click samples for given sound
    pub fn get_click(&self, sound: ClickSound) -> &[f32] {
        match sound {
            ClickSound::Strong => &self.strong_samples,
            ClickSound::Weak => &self.weak_samples,
            ClickSound::Sub => &self.sub_samples,
        }
    }

    /// Get duration of click in samples
    pub fn click_duration(&self) -> usize {
        self.strong_samples.len()
    }
}

/// Active click playback state
#[derive(Debug, Clone)]
struct ClickPlayback {
    sound: ClickSound,
    position: usize,
}

/// Click player fed by the audio callback
#[derive(Debug, Clone)]
pub struct Metronome {
    sound: MetronomeSound,
    enabled: bool,
    volume: f32,
    current_click: Option<ClickPlayback>,
}

impl Metronome {
    /// Create new click player
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sound: MetronomeSound::new(sample_rate),
            enabled: true,
            volume: 0.8,
            current_click: None,
        }
    }

    /// Enable/disable output
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.current_click = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set volume (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Start a click, cutting off any click still ringing
    pub fn trigger_click(&mut self, sound: ClickSound) {
        if !self.enabled {
            return;
        }

        self.current_click = Some(ClickPlayback { sound, position: 0 });
    }

    /// Process one sample of output
    /// Returns 0.0 when no click is active
    pub fn process_sample(&mut self) -> f32 {
        if let Some(ref mut playback) = self.current_click {
            let click_samples = self.sound.get_click(playback.sound);

            if playback.position < click_samples.len() {
                let sample = click_samples[playback.position] * self.volume;
                playback.position += 1;
                return sample;
            }
            self.current_click = None;
        }

        0.0
    }

    /// Process a buffer of output
    pub fn process_buffer(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.process_sample();
        }
    }

    /// Silence any click in progress
    pub fn reset(&mut self) {
        self.current_click = None;
    }
}
