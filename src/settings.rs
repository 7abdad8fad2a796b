// src/settings.rs
//
// Persisted audio preferences.
//
// Settings are always sanitized on the way in: out-of-range values are
// clamped to the nearest bound and non-numbers fall back to the default,
// so a hand-edited or partial document can never break playback.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::input::VelocityCurve;

/// User audio preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Master volume, 0..=1.
    pub volume: f32,

    /// Highest gain a MIDI note can reach, 0..=1.
    #[serde(rename = "midiGainCap")]
    pub midi_gain_cap: f32,

    /// Exponent of the velocity curve, 1..=3.
    #[serde(rename = "midiCurve")]
    pub midi_curve: f32,

    /// MIDI attack in seconds, 0..=0.05.
    #[serde(rename = "midiAttackSec")]
    pub midi_attack_seconds: f64,

    /// MIDI release in seconds, 0..=0.2.
    #[serde(rename = "midiReleaseSec")]
    pub midi_release_seconds: f64,
}

impl AudioSettings {
    pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
    pub const GAIN_CAP_RANGE: (f32, f32) = (0.0, 1.0);
    pub const CURVE_RANGE: (f32, f32) = (1.0, 3.0);
    pub const ATTACK_RANGE: (f64, f64) = (0.0, 0.05);
    pub const RELEASE_RANGE: (f64, f64) = (0.0, 0.2);

    /// Clamp every field into range; NaN becomes the default.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            volume: clamp_f32(self.volume, Self::VOLUME_RANGE, defaults.volume),
            midi_gain_cap: clamp_f32(
                self.midi_gain_cap,
                Self::GAIN_CAP_RANGE,
                defaults.midi_gain_cap,
            ),
            midi_curve: clamp_f32(self.midi_curve, Self::CURVE_RANGE, defaults.midi_curve),
            midi_attack_seconds: clamp_f64(
                self.midi_attack_seconds,
                Self::ATTACK_RANGE,
                defaults.midi_attack_seconds,
            ),
            midi_release_seconds: clamp_f64(
                self.midi_release_seconds,
                Self::RELEASE_RANGE,
                defaults.midi_release_seconds,
            ),
        }
    }

    /// Velocity-to-gain mapping for MIDI notes.
    #[inline]
    pub fn velocity_curve(&self) -> VelocityCurve {
        VelocityCurve::new(self.midi_gain_cap, self.midi_curve)
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 0.8,
            midi_gain_cap: 0.5,
            midi_curve: 1.5,
            midi_attack_seconds: 0.005,
            midi_release_seconds: 0.05,
        }
    }
}

fn clamp_f32(value: f32, (lo, hi): (f32, f32), fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

fn clamp_f64(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

/// Where settings live between sessions.
pub trait SettingsStore {
    /// Stored settings, sanitized. Anything unreadable yields defaults.
    fn load(&self) -> AudioSettings;

    fn save(&mut self, settings: &AudioSettings) -> Result<()>;
}

/// In-memory store. Clones share the stored value.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<AudioSettings>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(settings: AudioSettings) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Some(settings))),
        }
    }

    /// Last saved value, if any.
    pub fn saved(&self) -> Option<AudioSettings> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> AudioSettings {
        self.saved().unwrap_or_default().sanitized()
    }

    fn save(&mut self, settings: &AudioSettings) -> Result<()> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(*settings);
        Ok(())
    }
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/notequiz/audio-settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or(Error::NoSettingsLocation)?;
        path.push("notequiz");
        path.push("audio-settings.json");
        Ok(path)
    }

    pub fn at_default_location() -> Result<Self> {
        Self::default_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> AudioSettings {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                debug!("No settings at {}: {err}", self.path.display());
                return AudioSettings::default();
            }
        };

        match serde_json::from_str::<AudioSettings>(&text) {
            Ok(settings) => settings.sanitized(),
            Err(err) => {
                warn!(
                    "Ignoring unreadable settings {}: {err}",
                    self.path.display()
                );
                AudioSettings::default()
            }
        }
    }

    fn save(&mut self, settings: &AudioSettings) -> Result<()> {
        let io_err = |source| Error::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json =
            serde_json::to_string_pretty(settings).map_err(|source| Error::SettingsFormat {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, json).map_err(io_err)
    }
}
