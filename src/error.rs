// src/error.rs
//
// Error types.
//
// Nothing in the trainer is fatal. These errors surface from the loaders
// (exercises, samples, settings) and from the audio device seam; the
// trainer logs them and degrades to silence or a status message.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or parsing trainer inputs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid note name '{0}'")]
    InvalidNote(String),

    #[error("failed to parse exercise document: {0}")]
    ExerciseFormat(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode sample {path}: {source}")]
    SampleDecode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("failed to encode settings for {path}: {source}")]
    SettingsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no settings location available on this platform")]
    NoSettingsLocation,
}

/// Errors raised by the audio device seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The output device could not be opened.
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    /// The render side of the device went away.
    #[error("audio device closed")]
    Closed,

    /// A voice was stopped twice.
    #[error("voice already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
