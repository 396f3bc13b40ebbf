// Settings store
// Observable in-memory settings backed by an optional RON file

use super::SettingsError;
use super::serialization::{default_settings_path, load_from_file, save_to_file};
use super::types::{
    BEATS_RANGE, MetronomeSettings, SUBDIVISIONS_RANGE, SettingsChange, TEMPO_RANGE, check_range,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Identifies a subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SettingsCallback = Box<dyn FnMut(&MetronomeSettings, SettingsChange) + Send>;

/// Thread-shareable read-only view of the current settings
pub type SharedSettings = Arc<RwLock<MetronomeSettings>>;

/// Settings store
///
/// Every mutation is validated, written to storage, and only then committed
/// and announced to subscribers. A failed write leaves the store unchanged.
pub struct SettingsStore {
    path: Option<PathBuf>,
    settings: MetronomeSettings,
    shared: SharedSettings,
    subscribers: Vec<(SubscriptionId, SettingsCallback)>,
    next_subscription: u64,
}

impl SettingsStore {
    /// Store without persistence
    pub fn in_memory(settings: MetronomeSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::with_settings(None, settings))
    }

    /// Open a file-backed store, loading what is already there
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let settings = load_from_file(&path)?;
        log::info!("Settings loaded from {}", path.display());
        Ok(Self::with_settings(Some(path), settings))
    }

    /// Open the store at the platform config location
    pub fn open_default() -> Result<Self, SettingsError> {
        Self::open(default_settings_path()?)
    }

    fn with_settings(path: Option<PathBuf>, settings: MetronomeSettings) -> Self {
        Self {
            path,
            shared: Arc::new(RwLock::new(settings.clone())),
            settings,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current settings snapshot
    pub fn settings(&self) -> &MetronomeSettings {
        &self.settings
    }

    /// Snapshot kept in sync for readers on other threads
    pub fn shared(&self) -> SharedSettings {
        Arc::clone(&self.shared)
    }

    /// Register a change callback
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&MetronomeSettings, SettingsChange) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a change callback
    /// Returns false if the id was unknown
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn set_tempo(&mut self, tempo: u32) -> Result<(), SettingsError> {
        check_range("tempo", tempo, &TEMPO_RANGE)?;
        self.update(SettingsChange::Tempo, |s| s.tempo = tempo)
    }

    /// Nudge the tempo, clamping to the accepted range
    pub fn adjust_tempo(&mut self, delta: i32) -> Result<u32, SettingsError> {
        let tempo = (self.settings.tempo as i64 + delta as i64)
            .clamp(*TEMPO_RANGE.start() as i64, *TEMPO_RANGE.end() as i64) as u32;
        self.set_tempo(tempo)?;
        Ok(tempo)
    }

    /// Change the beat count, dropping gaps that fall outside the new measure
    pub fn set_beats(&mut self, beats: u32) -> Result<(), SettingsError> {
        check_range("beats", beats, &BEATS_RANGE)?;
        self.update(SettingsChange::Beats, |s| {
            s.beats = beats;
            s.prune_gaps();
        })
    }

    pub fn set_subdivisions(&mut self, subdivisions: u32) -> Result<(), SettingsError> {
        check_range("subdivisions", subdivisions, &SUBDIVISIONS_RANGE)?;
        self.update(SettingsChange::Subdivisions, |s| {
            s.subdivisions = subdivisions
        })
    }

    pub fn set_emphasize_first_beat(&mut self, emphasize: bool) -> Result<(), SettingsError> {
        self.update(SettingsChange::EmphasizeFirstBeat, |s| {
            s.emphasize_first_beat = emphasize
        })
    }

    /// Silence or un-silence a 1-indexed beat
    /// Returns whether the beat is now a gap
    pub fn toggle_gap(&mut self, beat: u32) -> Result<bool, SettingsError> {
        if beat == 0 || beat > self.settings.beats {
            return Err(SettingsError::GapOutOfRange {
                beat,
                beats: self.settings.beats,
            });
        }

        let now_gap = !self.settings.is_gap(beat);
        self.update(SettingsChange::Gaps, |s| {
            if now_gap {
                s.gaps.insert(beat);
            } else {
                s.gaps.remove(&beat);
            }
        })?;
        Ok(now_gap)
    }

    /// Re-read the backing file
    ///
    /// Subscribers hear `Reloaded` only when the stored content differs from
    /// what the store already holds. Returns whether anything changed.
    pub fn reload(&mut self) -> Result<bool, SettingsError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        let loaded = load_from_file(path)?;
        if loaded == self.settings {
            return Ok(false);
        }

        log::info!("Settings changed on disk, reloading");
        self.commit(loaded, SettingsChange::Reloaded);
        Ok(true)
    }

    fn update<F>(&mut self, change: SettingsChange, mutate: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut MetronomeSettings),
    {
        let mut next = self.settings.clone();
        mutate(&mut next);
        next.validate()?;

        if next == self.settings {
            return Ok(());
        }

        if let Some(path) = &self.path {
            if let Err(e) = save_to_file(path, &next) {
                log::error!("Failed to save settings to {}: {}", path.display(), e);
                return Err(e);
            }
        }

        self.commit(next, change);
        Ok(())
    }

    fn commit(&mut self, settings: MetronomeSettings, change: SettingsChange) {
        self.settings = settings;
        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = self.settings.clone();

        for (_, callback) in self.subscribers.iter_mut() {
            callback(&self.settings, change);
        }
    }
}

impl Default for SettingsStore {
    /// In-memory store holding the default settings
    fn default() -> Self {
        Self::with_settings(None, MetronomeSettings::default())
    }
}
