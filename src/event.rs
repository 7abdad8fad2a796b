// src/event.rs

use crate::automation::GainOp;
use crate::voice::VoiceSource;

/// Identifier of one voice on the render side.
///
/// Allocated by the control side, never reused within one device.
pub type VoiceId = u64;

/// ===============================
/// Render-side commands
/// ===============================

/// A request from the control side to the render side.
///
/// These commands:
/// - carry absolute audio-clock times, never wall-clock times
/// - are applied at the start of the next rendered block
/// - never block the control side
#[derive(Debug, Clone)]
pub enum Command {
    /// Create a voice that begins sounding at `at` with gain `initial_gain`.
    StartVoice {
        id: VoiceId,
        source: VoiceSource,
        at: f64,
        initial_gain: f32,
    },

    /// Change a voice's gain timeline.
    Gain { id: VoiceId, op: GainOp },

    /// Silence and disconnect the voice at `at`. Unknown ids are ignored.
    StopVoice { id: VoiceId, at: f64 },

    /// Change the master gain timeline.
    MasterGain { op: GainOp },
}
