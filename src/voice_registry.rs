// src/voice_registry.rs

use std::collections::HashMap;

use log::debug;

use crate::audio_context::AudioContext;
use crate::error::AudioError;
use crate::note::NoteSymbol;
use crate::voice::Voice;

/// Tracks every voice the trainer has started.
///
/// Responsibilities:
/// - keep scheduled and clicked voices (any number, unkeyed)
/// - keep held voices keyed by note (at most one per note)
/// - stop everything at once
///
/// Does NOT:
/// - decide gain shapes
/// - own timers
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    scheduled: Vec<Voice>,
    held: HashMap<NoteSymbol, Voice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a scheduled or clicked voice.
    pub fn register(&mut self, voice: Voice) {
        self.scheduled.push(voice);
    }

    /// Track `voice` as the held voice of `note`.
    ///
    /// A voice already held for the note is force-stopped first.
    pub fn hold(&mut self, audio: &mut AudioContext, note: NoteSymbol, voice: Voice) {
        if let Some(mut previous) = self.held.remove(&note) {
            debug!("Retriggered {note}; stopping previous voice {}", previous.id());
            stop_quietly(audio, &mut previous);
        }
        self.held.insert(note, voice);
    }

    /// Force-stop the voice held for `note`, if any. Returns whether one
    /// was held.
    pub fn stop_held(&mut self, audio: &mut AudioContext, note: &NoteSymbol) -> bool {
        match self.held.remove(note) {
            Some(mut voice) => {
                stop_quietly(audio, &mut voice);
                true
            }
            None => false,
        }
    }

    /// Stop tracking the held voice of `note` and hand it back.
    pub fn take_held(&mut self, note: &NoteSymbol) -> Option<Voice> {
        self.held.remove(note)
    }

    #[inline]
    pub fn is_held(&self, note: &NoteSymbol) -> bool {
        self.held.contains_key(note)
    }

    /// Stop every tracked voice and forget them all.
    ///
    /// Idempotent; safe with nothing registered.
    pub fn stop_all(&mut self, audio: &mut AudioContext) {
        let count = self.len();
        for mut voice in self.scheduled.drain(..) {
            stop_quietly(audio, &mut voice);
        }
        for (_, mut voice) in self.held.drain() {
            stop_quietly(audio, &mut voice);
        }
        if count > 0 {
            debug!("Stopped {count} voices");
        }
    }

    /// Forget unkeyed voices that have finished by `now`, released ones
    /// included. Held voices stay until released.
    pub fn prune(&mut self, now: f64) {
        self.scheduled.retain(|v| v.is_live(now));
    }

    /// Number of tracked voices, held ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.scheduled.len() + self.held.len()
    }

    #[inline]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stop a voice, ignoring the ones that were already stopped.
fn stop_quietly(audio: &mut AudioContext, voice: &mut Voice) {
    match voice.stop(audio) {
        Ok(()) | Err(AudioError::AlreadyStopped) => {}
        Err(err) => debug!("Stopping voice {} failed: {err}", voice.id()),
    }
}
