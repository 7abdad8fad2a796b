// src/transport.rs
//
// Musical-time knobs and the audio/wall clock correlation.

use crate::exercise::NoteDuration;

//
// ===============================
// MARK: Tempo
// ===============================
//

/// Tempo in quarter-note beats per minute, always within
/// [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    pub const MIN_BPM: u32 = 40;
    pub const MAX_BPM: u32 = 220;
    pub const DEFAULT_BPM: u32 = 90;

    /// Clamp a BPM value into range.
    pub fn new(bpm: u32) -> Self {
        Self {
            bpm: bpm.clamp(Self::MIN_BPM, Self::MAX_BPM),
        }
    }

    /// Parse user text. Non-numeric or zero input falls back to the default
    /// tempo; everything else is rounded and clamped.
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(bpm) if bpm.is_finite() && bpm != 0.0 => Self::new(bpm.round().max(0.0) as u32),
            _ => Self::default(),
        }
    }

    #[inline]
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Length of one beat in seconds.
    #[inline]
    pub fn beat_seconds(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    /// Length of a symbolic duration in seconds.
    #[inline]
    pub fn seconds(&self, duration: NoteDuration) -> f64 {
        duration.beats() * self.beat_seconds()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: Self::DEFAULT_BPM,
        }
    }
}

//
// ===============================
// MARK: Pause
// ===============================
//

/// Silent gap before each target note of a test, in seconds (never negative).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pause {
    seconds: f64,
}

impl Pause {
    pub const DEFAULT_SECONDS: f64 = 1.0;

    pub fn new(seconds: f64) -> Self {
        if !seconds.is_finite() {
            return Self::default();
        }
        Self {
            seconds: seconds.max(0.0),
        }
    }

    /// Parse user text; non-numeric input falls back to the default pause.
    pub fn parse(text: &str) -> Self {
        text.trim()
            .parse::<f64>()
            .map(Self::new)
            .unwrap_or_default()
    }

    #[inline]
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// Whole milliseconds, as used for wall-clock timers.
    #[inline]
    pub fn millis(&self) -> f64 {
        (self.seconds * 1000.0).round()
    }
}

impl Default for Pause {
    fn default() -> Self {
        Self {
            seconds: Self::DEFAULT_SECONDS,
        }
    }
}

//
// ===================================
// MARK: Clock correlation
// ===================================
//

/// Correlation between the audio clock (seconds) and the wall clock
/// (milliseconds), captured once per scheduling batch.
///
/// Every wall-clock deadline of the batch is derived from this single
/// pair so a long sequence does not accumulate drift.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClockOffset {
    audio_seconds: f64,
    wall_millis: f64,
}

impl ClockOffset {
    pub fn capture(audio_seconds: f64, wall_millis: f64) -> Self {
        Self {
            audio_seconds,
            wall_millis,
        }
    }

    /// Wall-clock instant (ms) matching an audio-clock time. Times in the
    /// past map to the capture instant.
    #[inline]
    pub fn wall_time(&self, audio_seconds: f64) -> f64 {
        self.wall_millis + ((audio_seconds - self.audio_seconds) * 1000.0).max(0.0)
    }

    #[inline]
    pub fn wall_millis(&self) -> f64 {
        self.wall_millis
    }

    #[inline]
    pub fn audio_seconds(&self) -> f64 {
        self.audio_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_clamps() {
        assert_eq!(Tempo::new(10).bpm(), 40);
        assert_eq!(Tempo::new(500).bpm(), 220);
        assert_eq!(Tempo::new(120).bpm(), 120);
    }

    #[test]
    fn test_tempo_parse() {
        assert_eq!(Tempo::parse("abc").bpm(), 90);
        assert_eq!(Tempo::parse("").bpm(), 90);
        assert_eq!(Tempo::parse("0").bpm(), 90);
        assert_eq!(Tempo::parse("-20").bpm(), 40);
        assert_eq!(Tempo::parse("119.6").bpm(), 120);
        assert_eq!(Tempo::parse("1e9").bpm(), 220);
    }

    #[test]
    fn test_durations_in_seconds() {
        let tempo = Tempo::new(120);
        assert_eq!(tempo.seconds(NoteDuration::Quarter), 0.5);
        assert_eq!(tempo.seconds(NoteDuration::Whole), 2.0);
        assert_eq!(tempo.seconds(NoteDuration::Eighth), 0.25);

        let slow = Tempo::new(90);
        assert!((slow.seconds(NoteDuration::Quarter) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pause_clamps() {
        assert_eq!(Pause::new(-3.0).seconds(), 0.0);
        assert_eq!(Pause::new(f64::NAN).seconds(), 1.0);
        assert_eq!(Pause::new(f64::INFINITY).seconds(), 1.0);
        assert_eq!(Pause::parse("x").seconds(), 1.0);
        assert_eq!(Pause::parse("0.25").millis(), 250.0);
    }

    #[test]
    fn test_clock_offset() {
        let offset = ClockOffset::capture(2.0, 10_000.0);
        assert!((offset.wall_time(2.1) - 10_100.0).abs() < 1e-6);
        assert_eq!(offset.wall_time(1.0), 10_000.0);
    }
}
