// src/note.rs
//
// Note symbols: parsing, canonical spelling, MIDI numbers and pitch.
//
// A NoteSymbol is stored in canonical form. Flats that have a sharp twin
// (Db, Eb, Gb, Ab, Bb) are respelled as that sharp at construction, so
// equality, hashing and sample lookup all see one spelling per pitch.
// Cb and Fb are not respelled and stay distinct from B and E.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// MIDI note number of the tuning reference A4.
pub const A4_MIDI: i32 = 69;

/// Frequency of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

const SHARP_NAMES: [(Letter, Accidental); 12] = [
    (Letter::C, Accidental::Natural),
    (Letter::C, Accidental::Sharp),
    (Letter::D, Accidental::Natural),
    (Letter::D, Accidental::Sharp),
    (Letter::E, Accidental::Natural),
    (Letter::F, Accidental::Natural),
    (Letter::F, Accidental::Sharp),
    (Letter::G, Accidental::Natural),
    (Letter::G, Accidental::Sharp),
    (Letter::A, Accidental::Natural),
    (Letter::A, Accidental::Sharp),
    (Letter::B, Accidental::Natural),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }

    /// Semitones above C within the octave.
    #[inline]
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    /// Scale-step index above C (C = 0 … B = 6).
    #[inline]
    pub fn step(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 1,
            Letter::E => 2,
            Letter::F => 3,
            Letter::G => 4,
            Letter::A => 5,
            Letter::B => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    #[inline]
    fn offset(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        }
    }
}

/// A single pitch name such as `C4`, `F#3` or `Bb5` (stored as `A#5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteSymbol {
    letter: Letter,
    accidental: Accidental,
    octave: i32,
}

impl NoteSymbol {
    /// Build a note, respelling flats to their sharp twin where one exists.
    pub fn new(letter: Letter, accidental: Accidental, octave: i32) -> Self {
        let (letter, accidental) = match (letter, accidental) {
            (Letter::D, Accidental::Flat) => (Letter::C, Accidental::Sharp),
            (Letter::E, Accidental::Flat) => (Letter::D, Accidental::Sharp),
            (Letter::G, Accidental::Flat) => (Letter::F, Accidental::Sharp),
            (Letter::A, Accidental::Flat) => (Letter::G, Accidental::Sharp),
            (Letter::B, Accidental::Flat) => (Letter::A, Accidental::Sharp),
            other => other,
        };

        Self {
            letter,
            accidental,
            octave,
        }
    }

    /// A note without accidental.
    pub const fn natural(letter: Letter, octave: i32) -> Self {
        Self {
            letter,
            accidental: Accidental::Natural,
            octave,
        }
    }

    /// Sharp-spelled note for a MIDI number (60 -> C4).
    pub fn from_midi(number: u8) -> Self {
        let number = number as i32;
        let (letter, accidental) = SHARP_NAMES[(number % 12) as usize];
        Self::new(letter, accidental, number / 12 - 1)
    }

    #[inline]
    pub fn letter(&self) -> Letter {
        self.letter
    }

    #[inline]
    pub fn accidental(&self) -> Accidental {
        self.accidental
    }

    #[inline]
    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// MIDI note number: `12 + semitone + octave * 12` (C4 = 60).
    #[inline]
    pub fn midi(&self) -> i32 {
        12 + self.letter.semitone() + self.accidental.offset() + self.octave * 12
    }

    /// Equal-tempered fundamental in Hz relative to A4 = 440.
    #[inline]
    pub fn frequency(&self) -> f64 {
        A4_FREQUENCY * 2.0_f64.powf((self.midi() - A4_MIDI) as f64 / 12.0)
    }
}

impl FromStr for NoteSymbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidNote(s.to_string());
        let trimmed = s.trim();
        let mut chars = trimmed.chars();

        let letter = chars.next().and_then(Letter::from_char).ok_or_else(invalid)?;
        let rest = chars.as_str();
        let (accidental, digits) = match rest.as_bytes().first() {
            Some(b'#') => (Accidental::Sharp, &rest[1..]),
            Some(b'b') => (Accidental::Flat, &rest[1..]),
            _ => (Accidental::Natural, rest),
        };

        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let octave = digits.parse::<i32>().map_err(|_| invalid())?;

        Ok(Self::new(letter, accidental, octave))
    }
}

impl TryFrom<String> for NoteSymbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteSymbol> for String {
    fn from(note: NoteSymbol) -> Self {
        note.to_string()
    }
}

impl fmt::Display for NoteSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.letter.as_char(),
            self.accidental.suffix(),
            self.octave
        )
    }
}

/// Canonical text form of a note name.
///
/// Parsable names come back sharp-spelled (`"db4"` -> `"C#4"`).
/// Anything else is returned trimmed and upper-cased, which keeps the
/// function idempotent.
pub fn normalize(name: &str) -> String {
    match name.parse::<NoteSymbol>() {
        Ok(note) => note.to_string(),
        Err(_) => name.trim().to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(s: &str) -> NoteSymbol {
        s.parse().unwrap()
    }

    #[test]
    fn test_flats_respell_to_sharps() {
        assert_eq!(normalize("Db4"), normalize("C#4"));
        assert_eq!(normalize("Db4"), "C#4");
        assert_eq!(note("Bb3"), note("A#3"));
        assert_eq!(normalize("eb5"), "D#5");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["C4", "db4", "Gb2", "Cb4", "E#3", "nonsense", "Eb", " a4 ", "DB4"] {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "input {name:?}");
        }
    }

    #[test]
    fn test_cb_and_fb_stay_distinct() {
        assert_ne!(note("Cb4"), note("B3"));
        assert_eq!(normalize("Cb4"), "Cb4");
        assert_eq!(note("Fb4").midi(), note("E4").midi());
    }

    #[test]
    fn test_octave_is_part_of_identity() {
        assert_ne!(note("C4"), note("C5"));
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in ["", "H4", "C", "C#", "C4x", "C-", "#4"] {
            assert!(bad.parse::<NoteSymbol>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_frequency_mapping() {
        assert_eq!(note("A4").frequency(), 440.0);
        assert!((note("A5").frequency() - 880.0).abs() < 1e-9);
        assert!((note("C4").frequency() - 261.63).abs() < 0.01);
        assert!((note("A3").frequency() - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_midi_numbers() {
        assert_eq!(note("C4").midi(), 60);
        assert_eq!(note("A4").midi(), 69);
        assert_eq!(note("C#4").midi(), 61);
        assert_eq!(note("C0").midi(), 12);
    }

    #[test]
    fn test_from_midi_uses_sharps() {
        assert_eq!(NoteSymbol::from_midi(60), note("C4"));
        assert_eq!(NoteSymbol::from_midi(61).to_string(), "C#4");
        assert_eq!(NoteSymbol::from_midi(21).to_string(), "A0");
        assert_eq!(NoteSymbol::from_midi(0).to_string(), "C-1");
        assert_eq!(note("C-1").midi(), 0);
    }

    #[test]
    fn test_serde_uses_canonical_text() {
        let parsed: NoteSymbol = serde_json::from_str("\"Ab4\"").unwrap();
        assert_eq!(parsed, note("G#4"));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"G#4\"");
        assert!(serde_json::from_str::<NoteSymbol>("\"Q9\"").is_err());
    }
}
