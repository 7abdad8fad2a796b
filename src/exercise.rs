// src/exercise.rs
//
// Exercises: the read-only note sequences a session plays and quizzes.
//
// The exercise document is JSON of the shape
//
//   { "samples": [ { "id": 1, "title": "...", "exercise": "...",
//                    "notes": [ { "note": "C4", "duration": "quarter" } ] } ] }
//
// and is loaded once at startup.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::note::NoteSymbol;

/// Symbolic note length. A beat is a quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoteDuration {
    Whole,
    Half,
    Quarter,
    Eighth,
}

impl NoteDuration {
    #[inline]
    pub fn beats(self) -> f64 {
        match self {
            NoteDuration::Whole => 4.0,
            NoteDuration::Half => 2.0,
            NoteDuration::Quarter => 1.0,
            NoteDuration::Eighth => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteDuration::Whole => "whole",
            NoteDuration::Half => "half",
            NoteDuration::Quarter => "quarter",
            NoteDuration::Eighth => "eighth",
        }
    }
}

/// Unknown names count as one beat.
impl From<String> for NoteDuration {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "whole" => NoteDuration::Whole,
            "half" => NoteDuration::Half,
            "eighth" => NoteDuration::Eighth,
            _ => NoteDuration::Quarter,
        }
    }
}

impl From<NoteDuration> for String {
    fn from(duration: NoteDuration) -> Self {
        duration.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseNote {
    pub note: NoteSymbol,
    pub duration: NoteDuration,
}

impl ExerciseNote {
    pub fn new(note: NoteSymbol, duration: NoteDuration) -> Self {
        Self { note, duration }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: u32,
    pub title: String,

    /// Free text shown alongside the staff.
    #[serde(default, rename = "exercise")]
    pub text: String,

    #[serde(default)]
    pub notes: Vec<ExerciseNote>,
}

impl Exercise {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ExerciseDocument {
    #[serde(default)]
    samples: Vec<Exercise>,
}

/// The fixed set of exercises available to a session.
#[derive(Debug, Clone, Default)]
pub struct ExerciseLibrary {
    exercises: Vec<Exercise>,
}

impl ExerciseLibrary {
    pub fn new(exercises: Vec<Exercise>) -> Self {
        Self { exercises }
    }

    /// Parse an exercise document.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ExerciseDocument = serde_json::from_str(json)?;
        Ok(Self::new(doc.samples))
    }

    /// Read and parse an exercise document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Self::from_json(&json)?;
        info!(
            "Loaded {} exercises from {}",
            library.len(),
            path.display()
        );
        Ok(library)
    }

    pub fn get(&self, id: u32) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    pub fn first(&self) -> Option<&Exercise> {
        self.exercises.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exercise> {
        self.exercises.iter()
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "samples": [
            {
                "id": 1,
                "title": "Steps",
                "exercise": "Stepwise motion from C4",
                "notes": [
                    { "note": "C4", "duration": "quarter" },
                    { "note": "Db4", "duration": "half" },
                    { "note": "E4", "duration": "dotted" }
                ]
            },
            { "id": 7, "title": "Empty" }
        ]
    }"#;

    #[test]
    fn test_parse_document() {
        let library = ExerciseLibrary::from_json(DOC).unwrap();
        assert_eq!(library.len(), 2);

        let steps = library.get(1).unwrap();
        assert_eq!(steps.title, "Steps");
        assert_eq!(steps.text, "Stepwise motion from C4");
        assert_eq!(steps.notes[1].note.to_string(), "C#4");
        assert_eq!(steps.notes[1].duration, NoteDuration::Half);

        let empty = library.get(7).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.text, "");
    }

    #[test]
    fn test_unknown_duration_is_one_beat() {
        let library = ExerciseLibrary::from_json(DOC).unwrap();
        let last = &library.get(1).unwrap().notes[2];
        assert_eq!(last.duration, NoteDuration::Quarter);
        assert_eq!(last.duration.beats(), 1.0);
    }

    #[test]
    fn test_duration_beats() {
        assert_eq!(NoteDuration::Whole.beats(), 4.0);
        assert_eq!(NoteDuration::Half.beats(), 2.0);
        assert_eq!(NoteDuration::Quarter.beats(), 1.0);
        assert_eq!(NoteDuration::Eighth.beats(), 0.5);
    }

    #[test]
    fn test_bad_note_fails_the_load() {
        let doc = r#"{ "samples": [ { "id": 1, "title": "x",
            "notes": [ { "note": "X9", "duration": "quarter" } ] } ] }"#;
        assert!(matches!(
            ExerciseLibrary::from_json(doc),
            Err(Error::ExerciseFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ExerciseLibrary::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
