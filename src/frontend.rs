// src/frontend.rs
//
// Seams to whatever shows the trainer to a person.
//
// The trainer never draws or prints. It hands note lists to a
// StaffRenderer and reports everything else (status lines, score, key
// feedback, MIDI availability) to a StatusSink.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::exercise::{Exercise, ExerciseNote};
use crate::note::NoteSymbol;
use crate::staff::{StaffLayout, StaffPosition};

// ═══════════════════════════════════════════════════════════════════
// Staff
// ═══════════════════════════════════════════════════════════════════

pub trait StaffRenderer {
    /// Draw `notes` without highlight. Returns the head position of each
    /// note, or `None` for notes that could not be placed.
    fn redraw(&mut self, notes: &[ExerciseNote]) -> Vec<Option<StaffPosition>>;

    /// Overlay a highlight on note `index`, drawn at `position`.
    fn highlight(&mut self, index: usize, position: StaffPosition);
}

// ═══════════════════════════════════════════════════════════════════
// Status
// ═══════════════════════════════════════════════════════════════════

/// Status line of the test panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    TestStarted,
    Correct,
    Wrong,
    Finished,
    TestStopped,
    NoExercise,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::TestStarted => "Test started — listen and click the correct key.",
            Status::Correct => "Correct!",
            Status::Wrong => "Wrong — try again.",
            Status::Finished => "Finished — well done!",
            Status::TestStopped => "Test stopped.",
            Status::NoExercise => "No exercise loaded.",
        };
        f.write_str(text)
    }
}

/// MIDI availability as reported by the embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MidiStatus {
    Connected { devices: usize },
    NoDevices,
    AccessDenied,
    NotSupported,
}

impl fmt::Display for MidiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiStatus::Connected { devices: 1 } => f.write_str("MIDI: Connected (1 device)"),
            MidiStatus::Connected { devices } => {
                write!(f, "MIDI: Connected ({devices} devices)")
            }
            MidiStatus::NoDevices => f.write_str("MIDI: No devices found"),
            MidiStatus::AccessDenied => f.write_str("MIDI: Access Denied"),
            MidiStatus::NotSupported => f.write_str("MIDI: Not Supported"),
        }
    }
}

impl MidiStatus {
    /// Status for a successful scan that found `devices` inputs.
    pub fn from_device_count(devices: usize) -> Self {
        if devices == 0 {
            MidiStatus::NoDevices
        } else {
            MidiStatus::Connected { devices }
        }
    }
}

/// Transient marking of an on-screen key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFeedback {
    Active,
    Correct,
    Wrong,
}

impl KeyFeedback {
    /// How long the marking stays when shown transiently, in ms.
    pub fn millis(self) -> f64 {
        match self {
            KeyFeedback::Active => 200.0,
            KeyFeedback::Correct => 400.0,
            KeyFeedback::Wrong => 500.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyFeedback::Active => "active",
            KeyFeedback::Correct => "correct",
            KeyFeedback::Wrong => "wrong",
        }
    }
}

/// Receives everything the trainer reports. Every method defaults to doing
/// nothing so sinks implement only what they show.
pub trait StatusSink {
    fn status(&mut self, _status: Status) {}

    fn score(&mut self, _score: u32, _attempts: u32) {}

    /// Mark the key of `note`. Markings of different kinds coexist.
    fn key_marked(&mut self, _note: &NoteSymbol, _feedback: KeyFeedback) {}

    /// Remove one marking from the key of `note`.
    fn key_unmarked(&mut self, _note: &NoteSymbol, _feedback: KeyFeedback) {}

    fn midi_status(&mut self, _status: MidiStatus) {}

    fn exercise_selected(&mut self, _exercise: &Exercise) {}
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {}

// ═══════════════════════════════════════════════════════════════════
// Recording front end
// ═══════════════════════════════════════════════════════════════════

/// One observation made by a [`Recorder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FrontendEvent {
    Redraw { notes: usize },
    Highlight { index: usize },
    Status(Status),
    Score { score: u32, attempts: u32 },
    KeyMarked {
        note: NoteSymbol,
        feedback: KeyFeedback,
    },
    KeyUnmarked {
        note: NoteSymbol,
        feedback: KeyFeedback,
    },
    Midi(MidiStatus),
    ExerciseSelected { id: u32 },
}

/// Front end that records what it is told. Lays the staff out with the
/// default [`StaffLayout`]. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    layout: StaffLayout,
    events: Arc<Mutex<Vec<FrontendEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: FrontendEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<FrontendEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded events, clearing the log.
    pub fn take(&self) -> Vec<FrontendEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Most recent status line.
    pub fn last_status(&self) -> Option<Status> {
        self.events().iter().rev().find_map(|e| match e {
            FrontendEvent::Status(status) => Some(*status),
            _ => None,
        })
    }

    /// Indices highlighted so far, in order.
    pub fn highlights(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                FrontendEvent::Highlight { index } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

impl StaffRenderer for Recorder {
    fn redraw(&mut self, notes: &[ExerciseNote]) -> Vec<Option<StaffPosition>> {
        self.push(FrontendEvent::Redraw { notes: notes.len() });
        self.layout.positions(notes).into_iter().map(Some).collect()
    }

    fn highlight(&mut self, index: usize, _position: StaffPosition) {
        self.push(FrontendEvent::Highlight { index });
    }
}

impl StatusSink for Recorder {
    fn status(&mut self, status: Status) {
        self.push(FrontendEvent::Status(status));
    }

    fn score(&mut self, score: u32, attempts: u32) {
        self.push(FrontendEvent::Score { score, attempts });
    }

    fn key_marked(&mut self, note: &NoteSymbol, feedback: KeyFeedback) {
        self.push(FrontendEvent::KeyMarked {
            note: *note,
            feedback,
        });
    }

    fn key_unmarked(&mut self, note: &NoteSymbol, feedback: KeyFeedback) {
        self.push(FrontendEvent::KeyUnmarked {
            note: *note,
            feedback,
        });
    }

    fn midi_status(&mut self, status: MidiStatus) {
        self.push(FrontendEvent::Midi(status));
    }

    fn exercise_selected(&mut self, exercise: &Exercise) {
        self.push(FrontendEvent::ExerciseSelected { id: exercise.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Correct.to_string(), "Correct!");
        assert_eq!(Status::TestStopped.to_string(), "Test stopped.");
        assert_eq!(Status::NoExercise.to_string(), "No exercise loaded.");
        assert!(Status::Wrong.to_string().starts_with("Wrong"));
    }

    #[test]
    fn test_midi_status_text() {
        assert_eq!(
            MidiStatus::from_device_count(1).to_string(),
            "MIDI: Connected (1 device)"
        );
        assert_eq!(
            MidiStatus::from_device_count(3).to_string(),
            "MIDI: Connected (3 devices)"
        );
        assert_eq!(
            MidiStatus::from_device_count(0).to_string(),
            "MIDI: No devices found"
        );
        assert_eq!(MidiStatus::NotSupported.to_string(), "MIDI: Not Supported");
    }

    #[test]
    fn test_feedback_durations() {
        assert_eq!(KeyFeedback::Active.millis(), 200.0);
        assert_eq!(KeyFeedback::Correct.millis(), 400.0);
        assert_eq!(KeyFeedback::Wrong.millis(), 500.0);
    }

    #[test]
    fn test_recorder_clones_share_log() {
        let recorder = Recorder::new();
        let mut sink = recorder.clone();
        sink.status(Status::TestStarted);
        sink.score(0, 0);
        assert_eq!(recorder.last_status(), Some(Status::TestStarted));
        assert_eq!(recorder.take().len(), 2);
        assert!(recorder.events().is_empty());
    }
}
