// src/input.rs
//
// Input adapter.
//
// Pointer clicks on a key, computer-keyboard presses and MIDI channel
// messages all arrive here in their raw form and leave as one of two
// normalized events: an attempt at a note (with how it was touched) or
// the release of a held note.

use std::sync::OnceLock;

use crate::note::{Accidental, Letter, NoteSymbol};

/// Lowest note of the playable keyboard.
pub const KEYBOARD_LOW: NoteSymbol = NoteSymbol::natural(Letter::C, 3);

/// Highest note of the playable keyboard.
pub const KEYBOARD_HIGH: NoteSymbol = NoteSymbol::natural(Letter::C, 6);

/// Every note of the playable keyboard, C3 to C6, sharp-spelled.
pub fn keyboard_notes() -> &'static [NoteSymbol] {
    static NOTES: OnceLock<Vec<NoteSymbol>> = OnceLock::new();
    NOTES.get_or_init(|| {
        (KEYBOARD_LOW.midi()..=KEYBOARD_HIGH.midi())
            .map(|n| NoteSymbol::from_midi(n as u8))
            .collect()
    })
}

/// Whether `note` has a key on the playable keyboard.
pub fn on_keyboard(note: &NoteSymbol) -> bool {
    (KEYBOARD_LOW.midi()..=KEYBOARD_HIGH.midi()).contains(&note.midi())
}

/// Whether the key for `note` is a black key.
pub fn is_black_key(note: &NoteSymbol) -> bool {
    note.accidental() != Accidental::Natural
}

/// Note played by a computer-keyboard key, case-insensitive.
pub fn key_to_note(key: char) -> Option<NoteSymbol> {
    let (letter, accidental, octave) = match key.to_ascii_lowercase() {
        'z' => (Letter::C, Accidental::Natural, 3),
        'x' => (Letter::D, Accidental::Natural, 3),
        'c' => (Letter::E, Accidental::Natural, 3),
        'v' => (Letter::F, Accidental::Natural, 3),
        'b' => (Letter::G, Accidental::Natural, 3),
        'n' => (Letter::A, Accidental::Natural, 3),
        'm' => (Letter::B, Accidental::Natural, 3),

        'a' => (Letter::C, Accidental::Natural, 4),
        'w' => (Letter::C, Accidental::Sharp, 4),
        's' => (Letter::D, Accidental::Natural, 4),
        'e' => (Letter::D, Accidental::Sharp, 4),
        'd' => (Letter::E, Accidental::Natural, 4),
        'f' => (Letter::F, Accidental::Natural, 4),
        't' => (Letter::F, Accidental::Sharp, 4),
        'g' => (Letter::G, Accidental::Natural, 4),
        'y' => (Letter::G, Accidental::Sharp, 4),
        'h' => (Letter::A, Accidental::Natural, 4),
        'u' => (Letter::A, Accidental::Sharp, 4),
        'j' => (Letter::B, Accidental::Natural, 4),

        'k' => (Letter::C, Accidental::Natural, 5),
        'o' => (Letter::C, Accidental::Sharp, 5),
        'l' => (Letter::D, Accidental::Natural, 5),
        'p' => (Letter::D, Accidental::Sharp, 5),
        ';' => (Letter::E, Accidental::Natural, 5),
        '\'' => (Letter::F, Accidental::Natural, 5),
        '[' => (Letter::F, Accidental::Sharp, 5),
        ']' => (Letter::G, Accidental::Natural, 5),
        '\\' => (Letter::G, Accidental::Sharp, 5),
        ',' => (Letter::A, Accidental::Natural, 5),
        '.' => (Letter::A, Accidental::Sharp, 5),
        '/' => (Letter::B, Accidental::Natural, 5),

        ' ' => (Letter::C, Accidental::Natural, 6),
        _ => return None,
    };
    Some(NoteSymbol::new(letter, accidental, octave))
}

// ═══════════════════════════════════════════════════════════════════
// MIDI
// ═══════════════════════════════════════════════════════════════════

/// A MIDI channel message, reduced to what the trainer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },

    /// Any other status byte. Ignored.
    Other,
}

impl MidiMessage {
    /// Classify a raw message on any channel.
    ///
    /// Note-on is `0x9n` with velocity > 0; note-off is `0x8n`, or `0x9n`
    /// with velocity 0. Short messages and every other status are `Other`.
    pub fn parse(bytes: &[u8]) -> Self {
        let &[status, note, velocity, ..] = bytes else {
            return MidiMessage::Other;
        };

        match status & 0xF0 {
            0x90 if velocity > 0 => MidiMessage::NoteOn {
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            },
            0x90 | 0x80 => MidiMessage::NoteOff { note: note & 0x7F },
            _ => MidiMessage::Other,
        }
    }
}

/// Maps MIDI velocity to voice gain: `min(cap, (v / 127)^curve × cap)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCurve {
    pub cap: f32,
    pub curve: f32,
}

impl VelocityCurve {
    pub fn new(cap: f32, curve: f32) -> Self {
        Self { cap, curve }
    }

    #[inline]
    pub fn gain(&self, velocity: u8) -> f32 {
        let normalized = velocity.min(127) as f32 / 127.0;
        (normalized.powf(self.curve) * self.cap).min(self.cap)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Normalized events
// ═══════════════════════════════════════════════════════════════════

/// How a note was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// Pointer click or computer key: full gain, automatic end.
    Click,

    /// MIDI note-on: velocity-shaped gain, held until note-off.
    Midi { velocity: u8 },
}

/// Raw input as delivered by the embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteInput {
    /// Click on the on-screen key for `note`.
    Pointer { note: NoteSymbol },

    /// Computer-keyboard key-down.
    Key { key: char, repeat: bool },

    /// MIDI channel message bytes.
    Midi { bytes: Vec<u8> },
}

/// Normalized input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Attempt { note: NoteSymbol, touch: Touch },
    Release { note: NoteSymbol },
}

impl NoteInput {
    /// Normalize raw input. Auto-repeated keys, unmapped keys, notes off
    /// the keyboard and non-note MIDI messages produce nothing.
    pub fn normalize(&self) -> Option<InputEvent> {
        match self {
            NoteInput::Pointer { note } => Some(InputEvent::Attempt {
                note: *note,
                touch: Touch::Click,
            }),

            NoteInput::Key { repeat: true, .. } => None,
            NoteInput::Key { key, .. } => key_to_note(*key).map(|note| InputEvent::Attempt {
                note,
                touch: Touch::Click,
            }),

            NoteInput::Midi { bytes } => match MidiMessage::parse(bytes) {
                MidiMessage::NoteOn { note, velocity } => {
                    let note = NoteSymbol::from_midi(note);
                    on_keyboard(&note).then_some(InputEvent::Attempt {
                        note,
                        touch: Touch::Midi { velocity },
                    })
                }
                MidiMessage::NoteOff { note } => {
                    let note = NoteSymbol::from_midi(note);
                    on_keyboard(&note).then_some(InputEvent::Release { note })
                }
                MidiMessage::Other => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(s: &str) -> NoteSymbol {
        s.parse().unwrap()
    }

    #[test]
    fn test_keyboard_range() {
        let notes = keyboard_notes();
        assert_eq!(notes.len(), 37);
        assert_eq!(notes.first(), Some(&note("C3")));
        assert_eq!(notes.last(), Some(&note("C6")));
        assert!(on_keyboard(&note("Db4")));
        assert!(!on_keyboard(&note("B2")));
        assert!(!on_keyboard(&note("C#6")));
        assert!(is_black_key(&note("A#4")));
        assert!(!is_black_key(&note("A4")));
    }

    #[test]
    fn test_computer_key_map() {
        assert_eq!(key_to_note('z'), Some(note("C3")));
        assert_eq!(key_to_note('A'), Some(note("C4")));
        assert_eq!(key_to_note('w'), Some(note("C#4")));
        assert_eq!(key_to_note('j'), Some(note("B4")));
        assert_eq!(key_to_note(';'), Some(note("E5")));
        assert_eq!(key_to_note('\\'), Some(note("G#5")));
        assert_eq!(key_to_note('/'), Some(note("B5")));
        assert_eq!(key_to_note(' '), Some(note("C6")));
        assert_eq!(key_to_note('q'), None);
        assert_eq!(key_to_note('1'), None);
    }

    #[test]
    fn test_midi_parse() {
        assert_eq!(
            MidiMessage::parse(&[0x90, 60, 100]),
            MidiMessage::NoteOn {
                note: 60,
                velocity: 100
            }
        );
        assert_eq!(
            MidiMessage::parse(&[0x9F, 61, 1]),
            MidiMessage::NoteOn {
                note: 61,
                velocity: 1
            }
        );
        assert_eq!(MidiMessage::parse(&[0x93, 60, 0]), MidiMessage::NoteOff { note: 60 });
        assert_eq!(MidiMessage::parse(&[0x80, 60, 64]), MidiMessage::NoteOff { note: 60 });
        assert_eq!(MidiMessage::parse(&[0xB0, 64, 127]), MidiMessage::Other);
        assert_eq!(MidiMessage::parse(&[0xE0, 0, 64]), MidiMessage::Other);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), MidiMessage::Other);
        assert_eq!(MidiMessage::parse(&[]), MidiMessage::Other);
    }

    #[test]
    fn test_velocity_curve() {
        let curve = VelocityCurve::new(0.5, 2.0);
        assert!((curve.gain(127) - 0.5).abs() < 1e-6);
        assert!((curve.gain(64) - 0.127).abs() < 1e-3);
        assert_eq!(curve.gain(0), 0.0);

        let linear = VelocityCurve::new(1.0, 1.0);
        assert!((linear.gain(100) - 100.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_inputs() {
        assert_eq!(
            NoteInput::Key {
                key: 'a',
                repeat: false
            }
            .normalize(),
            Some(InputEvent::Attempt {
                note: note("C4"),
                touch: Touch::Click
            })
        );
        assert_eq!(
            NoteInput::Key {
                key: 'a',
                repeat: true
            }
            .normalize(),
            None
        );
        assert_eq!(
            NoteInput::Midi {
                bytes: vec![0x90, 64, 100]
            }
            .normalize(),
            Some(InputEvent::Attempt {
                note: note("E4"),
                touch: Touch::Midi { velocity: 100 }
            })
        );
        assert_eq!(
            NoteInput::Midi {
                bytes: vec![0x80, 64, 0]
            }
            .normalize(),
            Some(InputEvent::Release { note: note("E4") })
        );
        assert_eq!(
            NoteInput::Midi {
                bytes: vec![0x90, 21, 100]
            }
            .normalize(),
            None
        );
        assert_eq!(
            NoteInput::Midi {
                bytes: vec![0xC0, 5, 0]
            }
            .normalize(),
            None
        );
    }

    #[test]
    fn test_velocity_100_is_still_midi() {
        let event = NoteInput::Midi {
            bytes: vec![0x90, 60, 100],
        }
        .normalize();
        assert!(matches!(
            event,
            Some(InputEvent::Attempt {
                touch: Touch::Midi { velocity: 100 },
                ..
            })
        ));
    }
}
