// Main metronome screen

use crate::audio::engine::AudioEngine;
use crate::messaging::channels::{CommandProducer, CueConsumer};
use crate::messaging::command::Command;
use crate::messaging::notification::{Notification, NotificationCategory, NotificationLevel};
use crate::sequencer::{ClickSound, TickParameters, TickScheduler};
use crate::settings::{BEATS_RANGE, SUBDIVISIONS_RANGE, SettingsError, SettingsStore, TEMPO_RANGE};
use crate::ui::cue::Cue;
use eframe::egui;
use ringbuf::traits::{Consumer, Producer};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a beat indicator stays lit
const FLASH_DURATION: Duration = Duration::from_millis(120);
/// How often the settings file is checked for outside edits
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);
const MAX_NOTIFICATIONS: usize = 5;
const NOTIFICATION_LIFETIME_MS: u64 = 6_000;

const COLOR_IDLE: egui::Color32 = egui::Color32::from_rgb(60, 60, 70);
const COLOR_GAP: egui::Color32 = egui::Color32::from_rgb(30, 30, 30);
const COLOR_STRONG: egui::Color32 = egui::Color32::from_rgb(240, 90, 60);
const COLOR_WEAK: egui::Color32 = egui::Color32::from_rgb(90, 170, 240);

pub struct MetronomeApp {
    store: SettingsStore,
    scheduler: TickScheduler,
    cue_rx: CueConsumer,
    command_tx: Option<CommandProducer>,
    audio: Option<AudioEngine>,
    // Widget state mirrors the store
    tempo_ui: u32,
    beats_ui: u32,
    subdivisions_ui: u32,
    volume_ui: f32,
    last_flash: Option<Cue>,
    last_fault_count: u64,
    last_reload_check: Instant,
    last_reload_error: Option<String>,
    notification_queue: VecDeque<Notification>,
}

impl MetronomeApp {
    pub fn new(
        store: SettingsStore,
        scheduler: TickScheduler,
        cue_rx: CueConsumer,
        command_tx: Option<CommandProducer>,
        audio: Option<AudioEngine>,
    ) -> Self {
        let settings = store.settings().clone();
        let mut app = Self {
            store,
            scheduler,
            cue_rx,
            command_tx,
            audio,
            tempo_ui: settings.tempo,
            beats_ui: settings.beats,
            subdivisions_ui: settings.subdivisions,
            volume_ui: 0.8,
            last_flash: None,
            last_fault_count: 0,
            last_reload_check: Instant::now(),
            last_reload_error: None,
            notification_queue: VecDeque::new(),
        };

        if app.command_tx.is_none() {
            app.notify(Notification::warning(
                NotificationCategory::Audio,
                "No audio output, running visual-only".to_string(),
            ));
        }
        app
    }

    fn notify(&mut self, notification: Notification) {
        self.notification_queue.push_back(notification);
        while self.notification_queue.len() > MAX_NOTIFICATIONS {
            self.notification_queue.pop_front();
        }
    }

    fn report_settings_error(&mut self, error: SettingsError) {
        self.notify(Notification::error(
            NotificationCategory::Settings,
            error.to_string(),
        ));
    }

    /// Resync widget values after an edit was refused or clamped
    fn sync_widgets(&mut self) {
        let settings = self.store.settings();
        self.tempo_ui = settings.tempo;
        self.beats_ui = settings.beats;
        self.subdivisions_ui = settings.subdivisions;
    }

    /// Pick up edits made to the settings file by someone else
    ///
    /// Throttled to `RELOAD_INTERVAL`. The same read error is only reported
    /// once until the file becomes readable again.
    fn check_external_changes(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_reload_check) < RELOAD_INTERVAL {
            return;
        }
        self.last_reload_check = now;

        match self.store.reload() {
            Ok(changed) => {
                self.last_reload_error = None;
                if changed {
                    self.sync_widgets();
                    self.notify(Notification::info(
                        NotificationCategory::Settings,
                        "Settings reloaded from disk".to_string(),
                    ));
                }
            }
            Err(e) => {
                let message = e.to_string();
                if self.last_reload_error.as_deref() != Some(message.as_str()) {
                    log::warn!("Settings reload failed: {}", message);
                    self.last_reload_error = Some(message);
                    self.report_settings_error(e);
                }
            }
        }
    }

    /// Let the schedule follow a tempo that is still being dragged
    ///
    /// Nothing is written until the drag ends.
    fn preview_tempo(&mut self, tempo: u32) {
        let settings = self.store.settings();
        let preview = TickParameters::new(tempo, settings.beats, settings.subdivisions)
            .and_then(|params| self.scheduler.set_parameters(params));
        if let Err(e) = preview {
            log::debug!("Tempo preview {} rejected: {}", tempo, e);
        }
    }

    /// Persist the final tempo and put the schedule back on the store's value
    fn commit_tempo(&mut self, tempo: u32) {
        self.apply(|store| store.set_tempo(tempo));

        let restored = self
            .store
            .settings()
            .tick_parameters()
            .and_then(|params| self.scheduler.set_parameters(params));
        if let Err(e) = restored {
            log::error!("Could not restore schedule after tempo edit: {}", e);
        }
    }

    fn drain_cues(&mut self) {
        while let Some(cue) = self.cue_rx.try_pop() {
            if cue.flashes() {
                self.last_flash = Some(cue);
            }
        }

        let faults = self.scheduler.fault_count();
        if faults > self.last_fault_count {
            self.notify(Notification::warning(
                NotificationCategory::Scheduler,
                format!("{} tick(s) could not be presented", faults - self.last_fault_count),
            ));
            self.last_fault_count = faults;
        }

        self.notification_queue
            .retain(|n| n.is_recent(NOTIFICATION_LIFETIME_MS));
    }

    fn apply<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut SettingsStore) -> Result<(), SettingsError>,
    {
        if let Err(e) = edit(&mut self.store) {
            self.report_settings_error(e);
        }
        self.sync_widgets();
    }

    fn tempo_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let mut delta = 0;
            if ui.button("-5").clicked() {
                delta = -5;
            }
            if ui.button("-1").clicked() {
                delta = -1;
            }

            let slider = egui::Slider::new(&mut self.tempo_ui, TEMPO_RANGE).text("BPM");
            let response = ui.add(slider);

            if ui.button("+1").clicked() {
                delta = 1;
            }
            if ui.button("+5").clicked() {
                delta = 5;
            }

            let tempo = self.tempo_ui;
            if delta != 0 {
                self.apply(|store| store.adjust_tempo(delta).map(|_| ()));
            } else if response.drag_stopped() || (response.changed() && !response.dragged()) {
                self.commit_tempo(tempo);
            } else if response.changed() {
                self.preview_tempo(tempo);
            }
        });
    }

    fn meter_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Beats");
            let beats_changed = ui
                .add(egui::DragValue::new(&mut self.beats_ui).range(BEATS_RANGE))
                .changed();

            ui.label("Subdivisions");
            let subdivisions_changed = ui
                .add(egui::DragValue::new(&mut self.subdivisions_ui).range(SUBDIVISIONS_RANGE))
                .changed();

            if beats_changed {
                let beats = self.beats_ui;
                self.apply(|store| store.set_beats(beats));
            }
            if subdivisions_changed {
                let subdivisions = self.subdivisions_ui;
                self.apply(|store| store.set_subdivisions(subdivisions));
            }
        });

        let mut emphasize = self.store.settings().emphasize_first_beat;
        if ui.checkbox(&mut emphasize, "Accent first beat").changed() {
            self.apply(|store| store.set_emphasize_first_beat(emphasize));
        }
    }

    /// One indicator per beat; clicking toggles a gap
    fn beat_indicators(&mut self, ui: &mut egui::Ui) {
        let settings = self.store.settings().clone();
        let lit = self
            .last_flash
            .filter(|cue| cue.at.elapsed() < FLASH_DURATION && self.scheduler.state().is_playing());

        let mut toggled = None;
        ui.horizontal(|ui| {
            for beat in 1..=settings.beats {
                let (rect, response) =
                    ui.allocate_exact_size(egui::vec2(36.0, 36.0), egui::Sense::click());

                let color = match lit {
                    _ if settings.is_gap(beat) => COLOR_GAP,
                    Some(cue) if cue.beat == beat && cue.sound == ClickSound::Strong => {
                        COLOR_STRONG
                    }
                    Some(cue) if cue.beat == beat => COLOR_WEAK,
                    _ => COLOR_IDLE,
                };
                ui.painter().circle_filled(rect.center(), 14.0, color);

                if response.on_hover_text("Click to mute this beat").clicked() {
                    toggled = Some(beat);
                }
            }
        });

        if let Some(beat) = toggled {
            self.apply(|store| store.toggle_gap(beat).map(|_| ()));
        }
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let playing = self.scheduler.state().is_playing();
            let label = if playing { "Stop" } else { "Start" };

            if ui.add_sized([120.0, 40.0], egui::Button::new(label)).clicked() {
                if let Err(e) = self.scheduler.toggle() {
                    self.notify(Notification::error(
                        NotificationCategory::Scheduler,
                        e.to_string(),
                    ));
                }
                self.last_flash = None;
            }

            if let Some(audio) = &self.audio {
                ui.label(format!(
                    "{:.0} Hz, {} ch",
                    audio.sample_rate(),
                    audio.channels()
                ));
            }

            if self.command_tx.is_some() {
                let volume_changed = ui
                    .add(egui::Slider::new(&mut self.volume_ui, 0.0..=1.0).text("Volume"))
                    .changed();
                if volume_changed {
                    if let Some(tx) = self.command_tx.as_mut() {
                        let _ = tx.try_push(Command::SetVolume(self.volume_ui));
                    }
                }
            }
        });
    }

    fn notifications(&self, ui: &mut egui::Ui) {
        for notification in &self.notification_queue {
            let color = match notification.level {
                NotificationLevel::Info => egui::Color32::LIGHT_GRAY,
                NotificationLevel::Warning => egui::Color32::YELLOW,
                NotificationLevel::Error => egui::Color32::LIGHT_RED,
            };
            ui.colored_label(color, &notification.message);
        }
    }
}

impl eframe::App for MetronomeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_external_changes(Instant::now());
        self.drain_cues();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Metronome");
            ui.add_space(8.0);

            self.tempo_controls(ui);
            self.meter_controls(ui);
            ui.add_space(8.0);

            self.beat_indicators(ui);
            ui.add_space(8.0);

            self.transport_controls(ui);
            ui.separator();

            self.notifications(ui);
        });

        // Keep flashes responsive without spinning at full frame rate
        ctx.request_repaint_after(Duration::from_millis(16));
    }
}
