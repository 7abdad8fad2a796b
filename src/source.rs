// src/source.rs
//
// Per-voice signal generators used by the render engine.
//
// A SourcePlayer turns a VoiceSource into a stream of mono samples at the
// engine's output rate: a phase-accumulating oscillator for synth voices,
// a resampling cursor over a decoded buffer for sample voices.

use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::voice::VoiceSource;

/// Periodic waveform shapes (naive, non-bandlimited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Value at a normalized phase in `[0, 1)`.
    #[inline]
    pub fn value(self, phase: f64) -> f32 {
        let v = match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        };
        v as f32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            _ => Err(()),
        }
    }
}

/// Render-side playback state for one voice.
#[derive(Debug)]
pub struct SourcePlayer {
    source: VoiceSource,

    /// Read position in source frames. Unused by oscillators.
    cursor: f64,

    /// Cursor advance per output sample.
    step: f64,

    /// Samples produced so far. Oscillator phase is derived from it so
    /// rounding never accumulates across periods.
    frames: u64,

    output_rate: f64,
}

impl SourcePlayer {
    pub fn new(source: VoiceSource, output_rate: f64) -> Self {
        let step = match &source {
            VoiceSource::Synth { frequency, .. } => frequency / output_rate,
            VoiceSource::Sample(buffer) => buffer.sample_rate() / output_rate,
        };

        Self {
            source,
            cursor: 0.0,
            step,
            frames: 0,
            output_rate,
        }
    }

    /// Produce the next sample. Sample sources go silent past their end.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match &self.source {
            VoiceSource::Synth {
                waveform,
                frequency,
            } => {
                let phase = (self.frames as f64 * frequency / self.output_rate).fract();
                self.frames += 1;
                waveform.value(phase)
            }
            VoiceSource::Sample(buffer) => {
                let v = buffer.interpolate(self.cursor);
                self.cursor += self.step;
                v
            }
        }
    }

    /// True once a sample source has played past its last frame.
    /// Oscillators never finish.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        match &self.source {
            VoiceSource::Synth { .. } => false,
            VoiceSource::Sample(buffer) => self.cursor >= buffer.frames() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::samples::SampleBuffer;

    #[test]
    fn test_waveform_shapes() {
        assert!(Waveform::Sine.value(0.0).abs() < 1e-6);
        assert!((Waveform::Sine.value(0.25) - 1.0).abs() < 1e-6);
        assert_eq!(Waveform::Square.value(0.1), 1.0);
        assert_eq!(Waveform::Square.value(0.6), -1.0);
        assert_eq!(Waveform::Sawtooth.value(0.0), -1.0);
        assert_eq!(Waveform::Triangle.value(0.5), 1.0);
        assert_eq!(Waveform::Triangle.value(0.0), -1.0);
    }

    #[test]
    fn test_parse_waveform() {
        assert_eq!("Square".parse::<Waveform>(), Ok(Waveform::Square));
        assert_eq!("saw".parse::<Waveform>(), Ok(Waveform::Sawtooth));
        assert!("organ".parse::<Waveform>().is_err());
    }

    #[test]
    fn test_oscillator_period() {
        let mut player = SourcePlayer::new(
            VoiceSource::Synth {
                waveform: Waveform::Sawtooth,
                frequency: 100.0,
            },
            1_000.0,
        );
        let first: Vec<f32> = (0..10).map(|_| player.next_sample()).collect();
        assert_eq!(first[0], -1.0);
        for _ in 0..1_000 {
            let period: Vec<f32> = (0..10).map(|_| player.next_sample()).collect();
            for (a, b) in first.iter().zip(&period) {
                assert!((a - b).abs() < 1e-4, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_sample_resampling_and_end() {
        let buffer = Arc::new(SampleBuffer::new(vec![0.0, 1.0, 0.0, -1.0], 500.0));
        let mut player = SourcePlayer::new(VoiceSource::Sample(buffer), 1_000.0);

        let out: Vec<f32> = (0..8).map(|_| player.next_sample()).collect();
        assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5, 0.0, -0.5, -1.0, -0.5]);
        assert!(player.is_exhausted());
        assert_eq!(player.next_sample(), 0.0);
    }
}
