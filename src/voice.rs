// src/voice.rs
//
// Voices: one sounding instance of a note, seen from the control side.
//
// A Voice owns the render-side id of its sound and the generation of the
// master output it routes through. Its gain shape is fully scheduled at
// creation; afterwards it can only be stopped (immediately) or released
// (ramped down, then stopped). A voice is never restarted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio_context::{AudioContext, MasterOutput};
use crate::automation::{GainEvent, GainOp};
use crate::error::AudioError;
use crate::event::{Command, VoiceId};
use crate::note::NoteSymbol;
use crate::samples::{SampleBuffer, SampleTable};
use crate::source::Waveform;

/// Peak gain of scheduled synth notes, low enough for overlapping notes.
pub const SYNTH_PEAK: f32 = 0.12;

/// Peak gain of scheduled sample notes.
pub const SAMPLE_PEAK: f32 = 1.0;

/// Attack of scheduled notes, in seconds.
pub const SCHEDULED_ATTACK: f64 = 0.02;

/// Closing fade of scheduled notes, ending at the nominal end.
pub const SCHEDULED_FADE: f64 = 0.05;

/// Delay between the nominal end of a scheduled note and its stop.
pub const SCHEDULED_TAIL: f64 = 0.02;

/// Lifetime of a clicked synth note (linear fade over the whole span).
pub const CLICK_SYNTH_SECONDS: f64 = 0.5;

/// Lifetime of a clicked sample note.
pub const CLICK_SAMPLE_SECONDS: f64 = 0.75;

/// Shortest attack of a held note.
pub const MIN_ATTACK: f64 = 0.001;

/// Shortest release of a held note.
pub const MIN_RELEASE: f64 = 0.005;

/// Sound selected for the trainer's voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    /// Recorded samples, falling back to a sine for missing notes.
    #[default]
    Piano,
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Instrument {
    /// Waveform used when no sample is available.
    pub fn waveform(self) -> Waveform {
        match self {
            Instrument::Piano | Instrument::Sine => Waveform::Sine,
            Instrument::Square => Waveform::Square,
            Instrument::Sawtooth => Waveform::Sawtooth,
            Instrument::Triangle => Waveform::Triangle,
        }
    }

    #[inline]
    pub fn uses_samples(self) -> bool {
        matches!(self, Instrument::Piano)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Piano => f.write_str("piano"),
            other => f.write_str(other.waveform().as_str()),
        }
    }
}

impl FromStr for Instrument {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("piano") {
            return Ok(Instrument::Piano);
        }
        Ok(match s.parse::<Waveform>()? {
            Waveform::Sine => Instrument::Sine,
            Waveform::Square => Instrument::Square,
            Waveform::Sawtooth => Instrument::Sawtooth,
            Waveform::Triangle => Instrument::Triangle,
        })
    }
}

/// What a voice plays.
#[derive(Debug, Clone)]
pub enum VoiceSource {
    Sample(Arc<SampleBuffer>),
    Synth { waveform: Waveform, frequency: f64 },
}

impl VoiceSource {
    /// Pick the source for `note`: the instrument's sample when one is
    /// loaded, otherwise a synthesized tone. Never fails.
    pub fn select(instrument: Instrument, samples: &SampleTable, note: &NoteSymbol) -> Self {
        if instrument.uses_samples() {
            if let Some(buffer) = samples.get(note) {
                return VoiceSource::Sample(buffer);
            }
        }
        VoiceSource::Synth {
            waveform: instrument.waveform(),
            frequency: note.frequency(),
        }
    }

    #[inline]
    pub fn kind(&self) -> VoiceKind {
        match self {
            VoiceSource::Sample(_) => VoiceKind::Sample,
            VoiceSource::Synth { .. } => VoiceKind::Synth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    Sample,
    Synth,
}

impl VoiceKind {
    /// Peak gain of a scheduled note of this kind.
    #[inline]
    pub fn scheduled_peak(self) -> f32 {
        match self {
            VoiceKind::Sample => SAMPLE_PEAK,
            VoiceKind::Synth => SYNTH_PEAK,
        }
    }
}

/// A playable unit with its own gain control and stop handle.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    output: MasterOutput,
    kind: VoiceKind,

    /// Audio time the voice ends on its own, or was told to end.
    ends_at: Option<f64>,

    /// Set once stop was requested.
    stopped: bool,

    /// Set once a release ramp was requested. A released voice can still
    /// be force-stopped before its ramp ends.
    released: bool,
}

impl Voice {
    fn start(
        audio: &mut AudioContext,
        source: VoiceSource,
        at: f64,
        gain: &[GainEvent],
        ends_at: Option<f64>,
    ) -> Result<Self, AudioError> {
        let (output, id) = audio.allocate_voice()?;
        let kind = source.kind();

        audio.send(
            output,
            Command::StartVoice {
                id,
                source,
                at,
                initial_gain: 0.0,
            },
        )?;
        for event in gain {
            audio.send(
                output,
                Command::Gain {
                    id,
                    op: GainOp::Schedule(*event),
                },
            )?;
        }
        if let Some(end) = ends_at {
            audio.send(output, Command::StopVoice { id, at: end })?;
        }

        Ok(Self {
            id,
            output,
            kind,
            ends_at,
            stopped: false,
            released: false,
        })
    }

    /// A note of fixed length starting at audio time `start`.
    ///
    /// Gain ramps 0 → peak over 20 ms, holds, ramps back to 0 over the last
    /// 50 ms before the nominal end; the voice stops 20 ms after that end.
    pub fn scheduled(
        audio: &mut AudioContext,
        source: VoiceSource,
        start: f64,
        duration: f64,
    ) -> Result<Self, AudioError> {
        let peak = source.kind().scheduled_peak();
        let end = start + duration.max(0.0);
        let attack_end = (start + SCHEDULED_ATTACK).min(end);
        let fade_start = (end - SCHEDULED_FADE).max(attack_end);

        let gain = [
            GainEvent::SetValue {
                time: start,
                value: 0.0,
            },
            GainEvent::LinearRamp {
                time: attack_end,
                value: peak,
            },
            GainEvent::SetValue {
                time: fade_start,
                value: peak,
            },
            GainEvent::LinearRamp {
                time: end,
                value: 0.0,
            },
        ];

        Self::start(audio, source, start, &gain, Some(end + SCHEDULED_TAIL))
    }

    /// A clicked or typed note: full gain now, short automatic end.
    pub fn click(audio: &mut AudioContext, source: VoiceSource) -> Result<Self, AudioError> {
        let now = audio.now();
        let (gain, end) = match source.kind() {
            VoiceKind::Synth => {
                let end = now + CLICK_SYNTH_SECONDS;
                (
                    vec![
                        GainEvent::SetValue {
                            time: now,
                            value: 1.0,
                        },
                        GainEvent::LinearRamp {
                            time: end,
                            value: 0.0,
                        },
                    ],
                    end,
                )
            }
            VoiceKind::Sample => {
                let end = now + CLICK_SAMPLE_SECONDS;
                (
                    vec![
                        GainEvent::SetValue {
                            time: now,
                            value: 1.0,
                        },
                        GainEvent::SetValue {
                            time: end - SCHEDULED_FADE,
                            value: 1.0,
                        },
                        GainEvent::LinearRamp {
                            time: end,
                            value: 0.0,
                        },
                    ],
                    end,
                )
            }
        };

        Self::start(audio, source, now, &gain, Some(end))
    }

    /// A held note: ramps to `gain` over `attack` (at least 1 ms) and
    /// sounds until released.
    pub fn held(
        audio: &mut AudioContext,
        source: VoiceSource,
        gain: f32,
        attack: f64,
    ) -> Result<Self, AudioError> {
        let now = audio.now();
        let shape = [
            GainEvent::SetValue {
                time: now,
                value: 0.0,
            },
            GainEvent::LinearRamp {
                time: now + attack.max(MIN_ATTACK),
                value: gain,
            },
        ];

        Self::start(audio, source, now, &shape, None)
    }

    /// Silence the voice now, cutting short any release in progress.
    pub fn stop(&mut self, audio: &mut AudioContext) -> Result<(), AudioError> {
        if self.stopped {
            return Err(AudioError::AlreadyStopped);
        }
        self.stopped = true;

        let now = audio.now();
        self.ends_at = Some(self.ends_at.map_or(now, |end| end.min(now)));
        audio.send(self.output, Command::StopVoice { id: self.id, at: now })
    }

    /// Fade the voice out from wherever its gain is now, over `release`
    /// (at least 5 ms), then stop it.
    pub fn release(&mut self, audio: &mut AudioContext, release: f64) -> Result<(), AudioError> {
        if self.stopped || self.released {
            return Err(AudioError::AlreadyStopped);
        }
        self.released = true;

        let now = audio.now();
        let end = now + release.max(MIN_RELEASE);
        self.ends_at = Some(self.ends_at.map_or(end, |e| e.min(end)));

        let id = self.id;
        audio.send(
            self.output,
            Command::Gain {
                id,
                op: GainOp::CancelAndHold { time: now },
            },
        )?;
        audio.send(
            self.output,
            Command::Gain {
                id,
                op: GainOp::Schedule(GainEvent::LinearRamp {
                    time: end,
                    value: 0.0,
                }),
            },
        )?;
        audio.send(self.output, Command::StopVoice { id, at: end })
    }

    /// Whether the voice may still be sounding at audio time `now`.
    #[inline]
    pub fn is_live(&self, now: f64) -> bool {
        self.ends_at.is_none_or(|end| now < end)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }

    #[inline]
    pub fn id(&self) -> VoiceId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    #[inline]
    pub fn ends_at(&self) -> Option<f64> {
        self.ends_at
    }

    /// Generation of the master output this voice routes through.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.output.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_context::{LoopbackFactory, RenderSlot};

    const RATE: f64 = 1_000.0;

    fn context() -> (AudioContext, RenderSlot) {
        let slot = RenderSlot::new();
        let audio = AudioContext::new(LoopbackFactory::new(RATE, slot.clone()));
        (audio, slot)
    }

    /// Constant-valued source, so rendered samples equal the gain curve.
    fn dc() -> VoiceSource {
        VoiceSource::Synth {
            waveform: Waveform::Square,
            frequency: 0.001,
        }
    }

    fn render(slot: &RenderSlot, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        slot.render(&mut out, 1);
        out
    }

    #[test]
    fn test_select_prefers_samples_for_piano() {
        let samples = SampleTable::new();
        let c4: NoteSymbol = "C4".parse().unwrap();
        assert_eq!(
            VoiceSource::select(Instrument::Piano, &samples, &c4).kind(),
            VoiceKind::Synth
        );

        samples.insert(c4, SampleBuffer::new(vec![0.0; 8], 44_100.0));
        assert_eq!(
            VoiceSource::select(Instrument::Piano, &samples, &c4).kind(),
            VoiceKind::Sample
        );
        assert_eq!(
            VoiceSource::select(Instrument::Square, &samples, &c4).kind(),
            VoiceKind::Synth
        );
    }

    #[test]
    fn test_synth_fallback_frequency() {
        let a4: NoteSymbol = "A4".parse().unwrap();
        match VoiceSource::select(Instrument::Triangle, &SampleTable::new(), &a4) {
            VoiceSource::Synth { waveform, frequency } => {
                assert_eq!(waveform, Waveform::Triangle);
                assert_eq!(frequency, 440.0);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_instrument_names() {
        assert_eq!("piano".parse::<Instrument>(), Ok(Instrument::Piano));
        assert_eq!("Sawtooth".parse::<Instrument>(), Ok(Instrument::Sawtooth));
        assert!("harp".parse::<Instrument>().is_err());
        assert_eq!(Instrument::Square.to_string(), "square");
    }

    #[test]
    fn test_scheduled_envelope() {
        let (mut audio, slot) = context();
        let voice = Voice::scheduled(&mut audio, dc(), 0.1, 0.5).unwrap();
        assert_eq!(voice.ends_at(), Some(0.1 + 0.5 + SCHEDULED_TAIL));

        let out = render(&slot, 700);
        assert_eq!(out[50], 0.0);
        assert!((out[110] - SYNTH_PEAK / 2.0).abs() < 1e-3);
        assert!((out[300] - SYNTH_PEAK).abs() < 1e-6);
        assert!((out[575] - SYNTH_PEAK / 2.0).abs() < 1e-3);
        assert!(out[600..].iter().all(|&s| s.abs() < 1e-6));
        assert!(!voice.is_live(0.7));
    }

    #[test]
    fn test_click_synth_fades_out() {
        let (mut audio, slot) = context();
        let voice = Voice::click(&mut audio, dc()).unwrap();
        assert_eq!(voice.ends_at(), Some(CLICK_SYNTH_SECONDS));

        let out = render(&slot, 600);
        assert_eq!(out[0], 1.0);
        assert!((out[250] - 0.5).abs() < 1e-3);
        assert!(out[500..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_twice_reports_already_stopped() {
        let (mut audio, _slot) = context();
        let mut voice = Voice::held(&mut audio, dc(), 0.5, 0.0).unwrap();
        assert!(voice.is_live(10.0));

        voice.stop(&mut audio).unwrap();
        assert!(voice.is_stopped());
        assert_eq!(voice.stop(&mut audio), Err(AudioError::AlreadyStopped));
        assert_eq!(voice.release(&mut audio, 0.1), Err(AudioError::AlreadyStopped));
    }

    #[test]
    fn test_release_ramps_from_current_gain() {
        let (mut audio, slot) = context();
        let mut voice = Voice::held(&mut audio, dc(), 0.5, 0.01).unwrap();

        let attack = render(&slot, 20);
        assert!((attack[5] - 0.25).abs() < 1e-3);
        assert!((attack[19] - 0.5).abs() < 1e-6);

        voice.release(&mut audio, 0.1).unwrap();
        assert_eq!(voice.ends_at(), Some(0.02 + 0.1));

        let tail = render(&slot, 120);
        assert!((tail[0] - 0.5).abs() < 1e-6);
        assert!((tail[50] - 0.25).abs() < 1e-3);
        assert!(tail[100..].iter().all(|&s| s.abs() < 1e-6));
        assert!(!voice.is_live(0.13));
    }

    #[test]
    fn test_stop_cuts_release_short() {
        let (mut audio, slot) = context();
        let mut voice = Voice::held(&mut audio, dc(), 0.5, 0.0).unwrap();
        render(&slot, 10);

        voice.release(&mut audio, 0.2).unwrap();
        assert!(voice.is_released());
        assert_eq!(voice.release(&mut audio, 0.2), Err(AudioError::AlreadyStopped));

        voice.stop(&mut audio).unwrap();
        assert_eq!(voice.ends_at(), Some(0.01));
        assert!(render(&slot, 100).iter().all(|&s| s == 0.0));
        assert_eq!(voice.stop(&mut audio), Err(AudioError::AlreadyStopped));
    }
}
