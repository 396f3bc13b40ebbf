// Audio engine - CPAL output stream rendering metronome clicks
//
// The device's preferred sample format (F32, I16 or U16) is detected and a
// matching stream is built. Clicks are rendered in f32 and converted when
// written to the output buffer.
//
// On macOS the Stream is not Send, so the engine has to stay on the thread
// that created it (the UI thread).

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::Consumer;
use std::sync::{Arc, Mutex};

use crate::messaging::channels::CommandConsumer;
use crate::messaging::command::Command;
use crate::sequencer::Metronome;

pub struct AudioEngine {
    _device: Device,
    _stream: Stream,
    sample_rate: f32,
    channels: usize,
}

impl AudioEngine {
    /// Open the default output device and start rendering clicks
    ///
    /// Clicks arrive from the scheduler thread, volume changes from the UI;
    /// each producer gets its own single-producer ring buffer.
    pub fn new(
        command_rx_scheduler: CommandConsumer,
        command_rx_ui: CommandConsumer,
    ) -> Result<Self, String> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or("No audio device found")?;

        log::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| format!("Configuration error: {}", e))?;

        let sample_format = supported_config.sample_format();
        log::debug!("Audio config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f32;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let command_rx = Arc::new([
            Mutex::new(command_rx_scheduler),
            Mutex::new(command_rx_ui),
        ]);
        let metronome = Arc::new(Mutex::new(Metronome::new(sample_rate)));

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, channels, command_rx, metronome)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, channels, command_rx, metronome)
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, channels, command_rx, metronome)
            }
            _ => {
                return Err(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    sample_format
                ));
            }
        }?;

        stream
            .play()
            .map_err(|e| format!("Error starting stream: {}", e))?;

        log::info!("Audio engine started: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            _device: device,
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Build an output stream for sample type `T`
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        command_rx: Arc<[Mutex<CommandConsumer>; 2]>,
        metronome: Arc<Mutex<Metronome>>,
    ) -> Result<Stream, String>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no blocking locks in here
                    let Ok(mut metronome) = metronome.try_lock() else {
                        for sample in data.iter_mut() {
                            *sample = T::EQUILIBRIUM;
                        }
                        return;
                    };

                    for queue in command_rx.iter() {
                        if let Ok(mut rx) = queue.try_lock() {
                            while let Some(cmd) = rx.try_pop() {
                                apply_command(&mut metronome, cmd);
                            }
                        }
                    }

                    for frame in data.chunks_mut(channels) {
                        let value = T::from_sample(metronome.process_sample());
                        for channel_sample in frame.iter_mut() {
                            *channel_sample = value;
                        }
                    }
                },
                |err| {
                    // Runs outside the audio callback
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Error in stream creation: {}", e))
    }
}

fn apply_command(metronome: &mut Metronome, cmd: Command) {
    match cmd {
        Command::Click(sound) => metronome.trigger_click(sound),
        Command::SetVolume(volume) => metronome.set_volume(volume),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::ClickSound;

    #[test]
    fn test_apply_command() {
        let mut metronome = Metronome::new(48000.0);

        apply_command(&mut metronome, Command::SetVolume(0.25));
        assert_eq!(metronome.volume(), 0.25);

        apply_command(&mut metronome, Command::Click(ClickSound::Weak));
        let rendered = (0..100).any(|_| metronome.process_sample().abs() > 0.0001);
        assert!(rendered);
    }
}
