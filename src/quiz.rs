// src/quiz.rs
//
// The listen-then-answer test.
//
// TestSession is a pure state machine: it knows the exercise notes, the
// position in them and the score, nothing about audio or time. Every
// transition returns what happened; the trainer turns that into sound,
// timers and feedback.

use log::{debug, info};

use crate::exercise::{Exercise, ExerciseNote};
use crate::note::NoteSymbol;

/// Where a test is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestPhase {
    /// No test.
    #[default]
    Idle,

    /// A target was chosen; the pre-target pause has not been armed yet.
    Armed,

    /// Silent pause before the target plays.
    Waiting,

    /// The target is sounding; answers are ignored.
    Sounding,

    /// Waiting for the user's answer.
    Listening,

    /// Every note was answered. The final score stays visible.
    Finished,
}

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No test running: the note is just played.
    FreePlay,

    /// Input is locked: nothing happens, not even sound.
    Ignored,

    /// Wrong note; the target stays.
    Wrong,

    /// Right note; `next` is the index of the new target.
    Correct { next: usize },

    /// Right note and it was the last one.
    Finished,
}

#[derive(Debug, Clone, Default)]
pub struct TestSession {
    phase: TestPhase,
    notes: Vec<ExerciseNote>,
    index: usize,
    score: u32,
    attempts: u32,
}

impl TestSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a test over `exercise`.
    ///
    /// A missing exercise or one without notes does not start and leaves
    /// the session untouched.
    pub fn start(&mut self, exercise: Option<&Exercise>) -> bool {
        let Some(exercise) = exercise.filter(|e| !e.is_empty()) else {
            debug!("Test not started: no playable exercise");
            return false;
        };

        self.notes = exercise.notes.clone();
        self.index = 0;
        self.score = 0;
        self.attempts = 0;
        self.phase = TestPhase::Armed;
        info!(
            "Test started on '{}' ({} notes)",
            exercise.title,
            self.notes.len()
        );
        true
    }

    /// Armed → Waiting. Returns the target to play after the pause.
    pub fn begin_waiting(&mut self) -> Option<(usize, &ExerciseNote)> {
        if self.phase != TestPhase::Armed {
            return None;
        }
        self.phase = TestPhase::Waiting;
        self.notes.get(self.index).map(|n| (self.index, n))
    }

    /// Waiting → Sounding for target `index`. Stale indices are refused.
    pub fn begin_sounding(&mut self, index: usize) -> Option<&ExerciseNote> {
        if self.phase != TestPhase::Waiting || index != self.index {
            return None;
        }
        self.phase = TestPhase::Sounding;
        self.notes.get(index)
    }

    /// Sounding → Listening.
    pub fn unlock(&mut self) -> bool {
        if self.phase != TestPhase::Sounding {
            return false;
        }
        self.phase = TestPhase::Listening;
        true
    }

    /// Judge an attempt at `note`.
    pub fn attempt(&mut self, note: &NoteSymbol) -> Verdict {
        match self.phase {
            TestPhase::Idle | TestPhase::Finished => return Verdict::FreePlay,
            TestPhase::Armed | TestPhase::Waiting | TestPhase::Sounding => {
                return Verdict::Ignored;
            }
            TestPhase::Listening => {}
        }

        let Some(target) = self.notes.get(self.index) else {
            return Verdict::Ignored;
        };

        self.attempts += 1;
        if target.note != *note {
            debug!("Wrong: {} (expected {})", note, target.note);
            return Verdict::Wrong;
        }

        self.score += 1;
        self.index += 1;
        if self.index >= self.notes.len() {
            self.phase = TestPhase::Finished;
            info!("Test finished: {}/{}", self.score, self.attempts);
            Verdict::Finished
        } else {
            self.phase = TestPhase::Armed;
            Verdict::Correct { next: self.index }
        }
    }

    /// Back to idle from any state.
    pub fn stop(&mut self) {
        if self.phase != TestPhase::Idle {
            debug!("Test stopped in {:?}", self.phase);
        }
        *self = Self::default();
    }

    #[inline]
    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    /// A test is running (not idle, not finished).
    #[inline]
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, TestPhase::Idle | TestPhase::Finished)
    }

    /// Answers are being ignored.
    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(
            self.phase,
            TestPhase::Armed | TestPhase::Waiting | TestPhase::Sounding
        )
    }

    /// The note the test expects next.
    pub fn target(&self) -> Option<&ExerciseNote> {
        if self.is_active() {
            self.notes.get(self.index)
        } else {
            None
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
