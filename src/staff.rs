// src/staff.rs
//
// Treble-staff geometry.
//
// Positions are diatonic steps above the bottom line (E4 = 0, F4 = 1,
// G4 = 2, ...). Each step is half a line spacing. Accidentals sit on the
// line or space of their letter.

use crate::exercise::ExerciseNote;
use crate::frontend::StaffRenderer;
use crate::note::{Letter, NoteSymbol};

/// Number of lines on the staff.
pub const STAFF_LINES: usize = 5;

/// Diatonic index of the top line (F5).
pub const TOP_LINE_INDEX: i32 = 8;

/// Where a note head is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaffPosition {
    pub x: f32,
    pub y: f32,

    /// Diatonic steps above the bottom line.
    pub index: i32,
}

/// Diatonic steps of `note` above the bottom staff line.
pub fn diatonic_index(note: &NoteSymbol) -> i32 {
    let bottom = NoteSymbol::natural(Letter::E, 4);
    (note.octave() * 7 + note.letter().step()) - (bottom.octave() * 7 + bottom.letter().step())
}

/// Ledger lines needed for a note at `index`, as diatonic indices.
///
/// Below the staff every even index from -2 down to the note gets a line;
/// above it, every even index from 10 up.
pub fn ledger_lines(index: i32) -> Vec<i32> {
    if index <= -2 {
        (index..=-2).rev().filter(|i| i % 2 == 0).collect()
    } else if index >= TOP_LINE_INDEX + 2 {
        (TOP_LINE_INDEX + 2..=index).filter(|i| i % 2 == 0).collect()
    } else {
        Vec::new()
    }
}

/// Canvas layout of a single staff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaffLayout {
    pub left: f32,
    pub right: f32,
    pub bottom_line_y: f32,
    pub line_spacing: f32,

    /// Upper bound on the horizontal distance between note heads.
    pub max_gap: f32,
}

impl StaffLayout {
    pub const DEFAULT_WIDTH: f32 = 800.0;

    /// Standard layout on a canvas `width` pixels wide.
    pub fn new(width: f32) -> Self {
        Self {
            left: 40.0,
            right: width - 40.0,
            bottom_line_y: 140.0,
            line_spacing: 12.0,
            max_gap: 60.0,
        }
    }

    /// Y of each staff line, bottom first.
    pub fn line_ys(&self) -> [f32; STAFF_LINES] {
        std::array::from_fn(|i| self.bottom_line_y - i as f32 * self.line_spacing)
    }

    #[inline]
    pub fn y_for_index(&self, index: i32) -> f32 {
        self.bottom_line_y - index as f32 * (self.line_spacing / 2.0)
    }

    #[inline]
    fn x_start(&self) -> f32 {
        self.left + 10.0
    }

    /// Horizontal distance between heads for `count` notes.
    pub fn gap(&self, count: usize) -> f32 {
        let available = self.right - self.x_start();
        (available / count.max(1) as f32).min(self.max_gap)
    }

    /// Head position of every note, in order.
    pub fn positions(&self, notes: &[ExerciseNote]) -> Vec<StaffPosition> {
        let gap = self.gap(notes.len());
        notes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let index = diatonic_index(&n.note);
                StaffPosition {
                    x: self.x_start() + i as f32 * gap,
                    y: self.y_for_index(index),
                    index,
                }
            })
            .collect()
    }
}

impl Default for StaffLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WIDTH)
    }
}

/// Layout-only renderer: computes positions, draws nothing.
impl StaffRenderer for StaffLayout {
    fn redraw(&mut self, notes: &[ExerciseNote]) -> Vec<Option<StaffPosition>> {
        self.positions(notes).into_iter().map(Some).collect()
    }

    fn highlight(&mut self, _index: usize, _position: StaffPosition) {}
}
