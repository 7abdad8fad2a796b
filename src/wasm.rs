//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { notequiz_init, WebTrainer } from './notequiz.js';
//!
//! await init();
//! notequiz_init();
//!
//! const exercises = await (await fetch("data/exercises.json")).text();
//! const trainer = new WebTrainer(exercises, 48000, localStorage.getItem("audio"));
//!
//! playBtn.onclick = () => trainer.play();
//! document.onkeydown = (e) => trainer.key_down(e.key, e.repeat);
//! midiInput.onmidimessage = (m) => trainer.midi(m.data);
//!
//! (function frame() {
//!     trainer.tick(performance.now());
//!     for (const event of JSON.parse(trainer.drain_events())) { /* update the page */ }
//!     requestAnimationFrame(frame);
//! })();
//!
//! // Inside the audio callback:
//! trainer.render(outputBuffer, 2);
//! ```

use std::io::Cursor;

use wasm_bindgen::prelude::*;

use crate::audio_context::{AudioContext, LoopbackFactory, RenderSlot};
use crate::exercise::ExerciseLibrary;
use crate::frontend::{MidiStatus, Recorder};
use crate::input::NoteInput;
use crate::note::NoteSymbol;
use crate::samples::SampleBuffer;
use crate::settings::{AudioSettings, MemoryStore};
use crate::staff::StaffLayout;
use crate::timer::ManualClock;
use crate::trainer::Trainer;
use crate::transport::{Pause, Tempo};
use crate::voice::Instrument;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn notequiz_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Trainer
// ═══════════════════════════════════════════════════════════════════════════

/// The whole trainer, driven from the page.
///
/// Time comes from the page: pass `performance.now()` to [`tick`](Self::tick)
/// on every animation frame. Everything the trainer reports is queued as
/// JSON events and collected with [`drain_events`](Self::drain_events).
#[wasm_bindgen]
pub struct WebTrainer {
    trainer: Trainer,
    clock: ManualClock,
    recorder: Recorder,
    slot: RenderSlot,
    settings: MemoryStore,
}

#[wasm_bindgen]
impl WebTrainer {
    /// Create a trainer over an exercise document rendering at
    /// `sample_rate`. `settings_json` is a previously saved settings
    /// document, if any.
    #[wasm_bindgen(constructor)]
    pub fn new(
        exercises_json: &str,
        sample_rate: f64,
        settings_json: Option<String>,
    ) -> Result<WebTrainer, JsValue> {
        let library = ExerciseLibrary::from_json(exercises_json).map_err(js_error)?;

        let settings = match settings_json {
            Some(json) => match serde_json::from_str::<AudioSettings>(&json) {
                Ok(settings) => MemoryStore::with(settings),
                Err(err) => {
                    log::warn!("Ignoring saved settings: {err}");
                    MemoryStore::new()
                }
            },
            None => MemoryStore::new(),
        };

        let slot = RenderSlot::new();
        let clock = ManualClock::new();
        let recorder = Recorder::new();
        let audio = AudioContext::new(LoopbackFactory::new(sample_rate, slot.clone()));

        let mut trainer = Trainer::new(library, audio, clock.clone(), settings.clone())
            .with_renderer(recorder.clone())
            .with_status(recorder.clone());
        trainer.init();

        Ok(Self {
            trainer,
            clock,
            recorder,
            slot,
            settings,
        })
    }

    /// Advance to `now_ms` and run every task that is due.
    pub fn tick(&mut self, now_ms: f64) -> u32 {
        self.clock.set(now_ms);
        self.trainer.tick() as u32
    }

    /// Render interleaved audio into `output`.
    pub fn render(&mut self, output: &mut [f32], channels: u32) {
        self.slot.render(output, channels.max(1) as usize);
    }

    /// Queued reports as a JSON array, oldest first.
    pub fn drain_events(&self) -> String {
        serde_json::to_string(&self.recorder.take()).unwrap_or_else(|_| "[]".into())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Exercises
    // ─────────────────────────────────────────────────────────────────────

    /// `[{id, title, exercise, notes}]` of every exercise.
    pub fn exercises_json(&self) -> String {
        let exercises: Vec<_> = self.trainer.library().iter().collect();
        serde_json::to_string(&exercises).unwrap_or_else(|_| "[]".into())
    }

    /// Select an exercise; returns the selected id, 0 when there is none.
    pub fn select_exercise(&mut self, id: u32) -> u32 {
        self.trainer.select_exercise(id).unwrap_or(0)
    }

    /// Note-head positions of the selected exercise on a canvas `width`
    /// pixels wide, as JSON `[{x, y, index}]`.
    pub fn staff_positions(&self, width: f32) -> String {
        let positions = self
            .trainer
            .current_exercise()
            .map(|e| StaffLayout::new(width).positions(&e.notes))
            .unwrap_or_default();
        let points: Vec<_> = positions
            .iter()
            .map(|p| serde_json::json!({ "x": p.x, "y": p.y, "index": p.index }))
            .collect();
        serde_json::Value::Array(points).to_string()
    }

    pub fn play(&mut self) -> bool {
        self.trainer.play().is_some()
    }

    pub fn stop(&mut self) {
        self.trainer.stop_play();
    }

    pub fn start_test(&mut self) -> bool {
        self.trainer.start_test()
    }

    pub fn stop_test(&mut self) {
        self.trainer.stop_test();
    }

    pub fn score(&self) -> u32 {
        self.trainer.session().score()
    }

    pub fn attempts(&self) -> u32 {
        self.trainer.session().attempts()
    }

    pub fn is_locked(&self) -> bool {
        self.trainer.session().is_locked()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────

    /// Click on the on-screen key for `note` (e.g. "C#4").
    pub fn click(&mut self, note: &str) -> Result<(), JsValue> {
        let note: NoteSymbol = note.parse().map_err(js_error)?;
        self.trainer.handle_input(&NoteInput::Pointer { note });
        Ok(())
    }

    /// Computer-keyboard key-down, as `KeyboardEvent.key`.
    pub fn key_down(&mut self, key: &str, repeat: bool) {
        let mut chars = key.chars();
        if let (Some(key), None) = (chars.next(), chars.next()) {
            self.trainer.handle_input(&NoteInput::Key { key, repeat });
        }
    }

    /// Raw MIDI message bytes.
    pub fn midi(&mut self, bytes: &[u8]) {
        self.trainer.handle_input(&NoteInput::Midi {
            bytes: bytes.to_vec(),
        });
    }

    /// MIDI availability found by the page: "connected", "none", "denied"
    /// or anything else for unsupported.
    pub fn set_midi_status(&mut self, state: &str, devices: u32) {
        let status = match state {
            "connected" => MidiStatus::from_device_count(devices as usize),
            "none" => MidiStatus::NoDevices,
            "denied" => MidiStatus::AccessDenied,
            _ => MidiStatus::NotSupported,
        };
        self.trainer.set_midi_status(status);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sound
    // ─────────────────────────────────────────────────────────────────────

    /// Decode a WAV file and use it for `note`.
    pub fn load_sample(&mut self, note: &str, wav: &[u8]) -> Result<(), JsValue> {
        let note: NoteSymbol = note.parse().map_err(js_error)?;
        let buffer = SampleBuffer::decode(Cursor::new(wav)).map_err(js_error)?;
        self.trainer.samples().insert(note, buffer);
        Ok(())
    }

    /// Tempo from user text; returns the bpm in effect.
    pub fn set_tempo(&mut self, text: &str) -> u32 {
        self.trainer.set_tempo(Tempo::parse(text));
        self.trainer.tempo().bpm()
    }

    /// Pause from user text; returns the seconds in effect.
    pub fn set_pause(&mut self, text: &str) -> f64 {
        self.trainer.set_pause(Pause::parse(text));
        self.trainer.pause().seconds()
    }

    pub fn set_instrument(&mut self, name: &str) -> bool {
        match name.parse::<Instrument>() {
            Ok(instrument) => {
                self.trainer.set_instrument(instrument);
                true
            }
            Err(()) => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_volume(&mut self, volume: f32) {
        self.trainer.set_volume(volume);
    }

    pub fn set_midi_gain_cap(&mut self, cap: f32) {
        let settings = self.trainer.settings();
        self.trainer.update_settings(AudioSettings {
            midi_gain_cap: cap,
            ..settings
        });
    }

    pub fn set_midi_curve(&mut self, curve: f32) {
        let settings = self.trainer.settings();
        self.trainer.update_settings(AudioSettings {
            midi_curve: curve,
            ..settings
        });
    }

    pub fn set_midi_attack_ms(&mut self, millis: f64) {
        let settings = self.trainer.settings();
        self.trainer.update_settings(AudioSettings {
            midi_attack_seconds: millis / 1000.0,
            ..settings
        });
    }

    pub fn set_midi_release_ms(&mut self, millis: f64) {
        let settings = self.trainer.settings();
        self.trainer.update_settings(AudioSettings {
            midi_release_seconds: millis / 1000.0,
            ..settings
        });
    }

    pub fn reset_settings(&mut self) {
        self.trainer.reset_settings();
    }

    /// Last saved settings document, for the page to persist.
    pub fn settings_json(&self) -> String {
        let settings = self.settings.saved().unwrap_or_else(|| self.trainer.settings());
        serde_json::to_string(&settings).unwrap_or_else(|_| "{}".into())
    }
}
