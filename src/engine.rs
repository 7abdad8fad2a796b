// src/engine.rs

use crate::automation::GainParam;
use crate::event::{Command, VoiceId};
use crate::source::SourcePlayer;

/// Capacity reserved for simultaneous voices. More are accepted but may
/// allocate on the render thread.
const VOICE_CAPACITY: usize = 64;

/// One sounding voice on the render side.
struct RenderVoice {
    id: VoiceId,
    player: SourcePlayer,
    gain: GainParam,

    /// Audio time the source starts.
    start: f64,

    /// Audio time the voice is silenced and disconnected.
    stop: Option<f64>,
}

impl RenderVoice {
    #[inline]
    fn is_sounding(&self, t: f64) -> bool {
        t >= self.start && self.stop.is_none_or(|stop| t < stop)
    }
}

/// Real-time software renderer.
///
/// This struct runs exclusively on the render side.
/// It knows audio-clock seconds only; it does no musical-time reasoning
/// and no wall-clock reasoning.
///
/// Responsibilities:
/// - apply render commands at block boundaries
/// - mix every sounding voice through its gain timeline and the master gain
/// - drop voices once their stop time has passed
///
/// Does NOT:
/// - decide when notes happen
/// - track which voices belong to which note
pub struct Engine {
    sample_rate: f64,

    /// Active voice set
    voices: Vec<RenderVoice>,

    /// Master output gain
    master: GainParam,

    /// Current sample position
    sample_pos: u64,
}

impl Engine {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            voices: Vec::with_capacity(VOICE_CAPACITY),
            master: GainParam::new(1.0),
            sample_pos: 0,
        }
    }

    /// Apply a control-side command immediately.
    #[inline]
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::StartVoice {
                id,
                source,
                at,
                initial_gain,
            } => {
                self.voices.retain(|v| v.id != id);
                self.voices.push(RenderVoice {
                    id,
                    player: SourcePlayer::new(source, self.sample_rate),
                    gain: GainParam::new(initial_gain),
                    start: at,
                    stop: None,
                });
            }

            Command::Gain { id, op } => {
                if let Some(voice) = self.voice_mut(id) {
                    voice.gain.apply(op);
                }
            }

            Command::StopVoice { id, at } => {
                if let Some(voice) = self.voice_mut(id) {
                    let at = voice.stop.map_or(at, |stop| stop.min(at));
                    voice.stop = Some(at);
                }
            }

            Command::MasterGain { op } => self.master.apply(op),
        }
    }

    fn voice_mut(&mut self, id: VoiceId) -> Option<&mut RenderVoice> {
        self.voices.iter_mut().find(|v| v.id == id)
    }

    /// Render one block of audio.
    ///
    /// `out` is interleaved with `channels` channels; the mono mix is
    /// written to every channel. Called once per block from the output
    /// callback. Does not allocate.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        for (frame, slot) in out.chunks_mut(channels).enumerate() {
            let t = self.time_at(self.sample_pos + frame as u64);

            let mut mix = 0.0;
            for voice in &mut self.voices {
                if voice.is_sounding(t) {
                    mix += voice.player.next_sample() * voice.gain.value_at(t);
                }
            }
            mix *= self.master.value_at(t);

            slot.fill(mix);
        }

        self.sample_pos += frames as u64;
        let now = self.now();

        self.voices.retain(|v| {
            let stopped = v.stop.is_some_and(|stop| stop <= now);
            let exhausted = now >= v.start && v.player.is_exhausted();
            !stopped && !exhausted
        });
        for voice in &mut self.voices {
            voice.gain.compact(now);
        }
        self.master.compact(now);
    }

    #[inline]
    fn time_at(&self, sample: u64) -> f64 {
        sample as f64 / self.sample_rate
    }

    /// Audio-clock seconds at the start of the next block.
    #[inline]
    pub fn now(&self) -> f64 {
        self.time_at(self.sample_pos)
    }

    #[inline]
    pub fn sample_position(&self) -> u64 {
        self.sample_pos
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Get active voice count
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{GainEvent, GainOp};
    use crate::source::Waveform;
    use crate::voice::VoiceSource;

    const RATE: f64 = 1_000.0;

    fn square() -> VoiceSource {
        VoiceSource::Synth {
            waveform: Waveform::Square,
            frequency: 1.0,
        }
    }

    fn start(engine: &mut Engine, id: VoiceId, at: f64) {
        engine.apply(Command::StartVoice {
            id,
            source: square(),
            at,
            initial_gain: 0.5,
        });
    }

    #[test]
    fn test_voice_starts_at_its_time() {
        let mut engine = Engine::new(RATE);
        start(&mut engine, 1, 0.01);

        let mut out = [0.0; 20];
        engine.render(&mut out, 1);

        assert!(out[..10].iter().all(|&s| s == 0.0));
        assert!(out[10..].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_stop_disconnects_voice() {
        let mut engine = Engine::new(RATE);
        start(&mut engine, 1, 0.0);
        engine.apply(Command::StopVoice { id: 1, at: 0.005 });

        let mut out = [0.0; 10];
        engine.render(&mut out, 1);

        assert!(out[..5].iter().all(|&s| s == 0.5));
        assert!(out[5..].iter().all(|&s| s == 0.0));
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_later_stop_does_not_extend_earlier_one() {
        let mut engine = Engine::new(RATE);
        start(&mut engine, 1, 0.0);
        engine.apply(Command::StopVoice { id: 1, at: 0.003 });
        engine.apply(Command::StopVoice { id: 1, at: 0.5 });

        let mut out = [0.0; 5];
        engine.render(&mut out, 1);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_master_gain_and_channels() {
        let mut engine = Engine::new(RATE);
        start(&mut engine, 1, 0.0);
        engine.apply(Command::MasterGain {
            op: GainOp::Schedule(GainEvent::SetValue {
                time: 0.0,
                value: 0.5,
            }),
        });

        let mut out = [0.0; 6];
        engine.render(&mut out, 2);
        assert_eq!(out, [0.25; 6]);
        assert_eq!(engine.sample_position(), 3);
    }

    #[test]
    fn test_unknown_voice_commands_are_ignored() {
        let mut engine = Engine::new(RATE);
        engine.apply(Command::StopVoice { id: 9, at: 0.0 });
        engine.apply(Command::Gain {
            id: 9,
            op: GainOp::Cancel { time: 0.0 },
        });
        assert_eq!(engine.active_voices(), 0);
    }
}
