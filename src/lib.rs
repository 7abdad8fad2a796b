// src/lib.rs
//
// Library entry point.
//
// Audio path (leaf to root): automation → source → event → engine →
// bridge → audio_context. Session path: note/exercise → voice →
// voice_registry → timer → scheduler → quiz → input → trainer.

pub mod audio_context;
pub mod automation;
pub mod bridge;
pub mod engine;
pub mod error;
pub mod event;
pub mod exercise;
pub mod frontend;
pub mod input;
pub mod note;
pub mod quiz;
pub mod samples;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod staff;
pub mod timer;
pub mod trainer;
pub mod transport;
pub mod voice;
pub mod voice_registry;

#[cfg(feature = "native")]
pub mod output;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use audio_context::{AudioContext, DeviceFactory, LoopbackFactory, RenderSlot};
pub use error::{AudioError, Error, Result};
pub use exercise::{Exercise, ExerciseLibrary, ExerciseNote, NoteDuration};
pub use frontend::{MidiStatus, StaffRenderer, Status, StatusSink};
pub use input::{InputEvent, NoteInput, Touch};
pub use note::{NoteSymbol, normalize};
pub use quiz::{TestPhase, Verdict};
pub use samples::{SampleBuffer, SampleTable};
pub use settings::{AudioSettings, JsonFileStore, MemoryStore, SettingsStore};
pub use timer::{ManualClock, SystemClock, WallClock};
pub use trainer::Trainer;
pub use transport::{Pause, Tempo};
pub use voice::Instrument;
