use mymusic_metronome::ui::app::MetronomeApp;
use mymusic_metronome::{
    AudioEngine, CueDispatcher, SettingsStore, TickScheduler,
    create_command_channel, create_cue_channel,
};

// Ringbuffer capacity constants
// At the fastest setting (400 BPM x 8 subdivisions) a tick arrives every
// 18ms; 256 slots cover several seconds of a stalled consumer.
const AUDIO_RINGBUFFER_CAPACITY: usize = 256;
const CUE_RINGBUFFER_CAPACITY: usize = 256;

fn open_settings() -> SettingsStore {
    match SettingsStore::open_default() {
        Ok(store) => store,
        Err(e) => {
            log::error!("Could not open settings ({}), using defaults for this session", e);
            SettingsStore::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== MyMusic Metronome {} ===", env!("CARGO_PKG_VERSION"));

    let mut store = open_settings();

    let (command_tx_scheduler, command_rx) = create_command_channel(AUDIO_RINGBUFFER_CAPACITY);
    let (command_tx_ui, command_rx_ui) = create_command_channel(AUDIO_RINGBUFFER_CAPACITY);
    let (cue_tx, cue_rx) = create_cue_channel(CUE_RINGBUFFER_CAPACITY);

    // Audio is optional: without a device the metronome only flashes
    let audio = match AudioEngine::new(command_rx, command_rx_ui) {
        Ok(engine) => Some(engine),
        Err(e) => {
            log::warn!("Audio unavailable: {}", e);
            None
        }
    };
    let (audio_tx, ui_audio_tx) = if audio.is_some() {
        (Some(command_tx_scheduler), Some(command_tx_ui))
    } else {
        (None, None)
    };

    let dispatcher = CueDispatcher::new(store.shared(), audio_tx, cue_tx);
    let scheduler = TickScheduler::new(store.settings().tick_parameters()?, Box::new(dispatcher))?;

    // Settings edits (ours or reloaded from disk) reach the running schedule
    scheduler.follow(&mut store);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 320.0])
            .with_title("MyMusic Metronome"),
        ..Default::default()
    };

    eframe::run_native(
        "MyMusic Metronome",
        native_options,
        Box::new(move |_cc| {
            Ok(Box::new(MetronomeApp::new(
                store,
                scheduler,
                cue_rx,
                ui_audio_tx,
                audio,
            )))
        }),
    )?;

    Ok(())
}
