//! Thread-safe bridge between the trainer and the render engine.
//!
//! This module provides the communication layer that lets the control
//! side (the trainer and its timers) drive the real-time renderer without
//! blocking it.
//!
//! # Architecture
//!
//! - **Control side** owns [`DeviceHandle`]: it allocates voice ids, sends
//!   [`Command`]s and reads the audio clock
//! - **Render side** owns [`RenderHandle`] with the [`Engine`]
//! - Communication uses an MPSC channel for commands and atomics for readback
//!
//! # Usage
//!
//! ```ignore
//! let (device, mut render) = create_bridge(48_000.0);
//!
//! // Control side: read the clock and send commands
//! let now = device.now();
//! device.send(Command::StopVoice { id, at: now })?;
//!
//! // Render side, from the output callback
//! render.render(&mut block, 2);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
};

use log::debug;

use crate::engine::Engine;
use crate::error::AudioError;
use crate::event::{Command, VoiceId};

/// Control-side handle to one open audio device.
pub struct DeviceHandle {
    /// Channel to send commands to the renderer.
    command_tx: Sender<Command>,

    /// Shared readback state (updated by the renderer).
    readback: Arc<SharedReadback>,

    sample_rate: f64,
    next_voice: VoiceId,
}

/// Render-side handle containing the engine and its command channel.
///
/// Dropping it closes the device: the control side then sees
/// [`DeviceHandle::is_closed`] and reopens on next use.
pub struct RenderHandle {
    /// The software renderer (owned by the render side).
    engine: Engine,

    /// Channel to receive commands from the control side.
    command_rx: Receiver<Command>,

    /// Shared readback state (written by the renderer).
    readback: Arc<SharedReadback>,
}

/// Lock-free shared state for render → control readback.
struct SharedReadback {
    sample_position: AtomicU64,
    active_voices: AtomicU64,
    running: AtomicBool,
    closed: AtomicBool,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            sample_position: AtomicU64::new(0),
            active_voices: AtomicU64::new(0),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

/// Create a linked pair of handles for one device running at `sample_rate`.
pub fn create_bridge(sample_rate: f64) -> (DeviceHandle, RenderHandle) {
    let (command_tx, command_rx) = mpsc::channel();
    let readback = Arc::new(SharedReadback::new());

    let device = DeviceHandle {
        command_tx,
        readback: Arc::clone(&readback),
        sample_rate,
        next_voice: 1,
    };

    let render = RenderHandle {
        engine: Engine::new(sample_rate),
        command_rx,
        readback,
    };

    (device, render)
}

// ═══════════════════════════════════════════════════════════════════
// DeviceHandle - Control Side API
// ═══════════════════════════════════════════════════════════════════

impl DeviceHandle {
    /// Audio-clock seconds: the renderer's sample position over its rate.
    ///
    /// Monotonic and independent of wall-clock timers.
    #[inline]
    pub fn now(&self) -> f64 {
        self.readback.sample_position.load(Ordering::Acquire) as f64 / self.sample_rate
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Send a command to the renderer.
    pub fn send(&self, command: Command) -> Result<(), AudioError> {
        if self.is_closed() {
            return Err(AudioError::Closed);
        }
        self.command_tx.send(command).map_err(|_| AudioError::Closed)
    }

    /// Reserve an id for a new voice.
    pub fn allocate_voice(&mut self) -> VoiceId {
        let id = self.next_voice;
        self.next_voice += 1;
        id
    }

    /// True once the render side was dropped or [`close`](Self::close) was called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.readback.closed.load(Ordering::Acquire)
    }

    /// Mark the device closed. The render side renders silence from now on.
    pub fn close(&self) {
        self.readback.closed.store(true, Ordering::Release);
    }

    /// True once the render side has produced at least one block.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.readback.running.load(Ordering::Relaxed)
    }

    /// Voices the renderer was mixing at the end of its last block.
    #[inline]
    pub fn active_voices(&self) -> usize {
        self.readback.active_voices.load(Ordering::Relaxed) as usize
    }
}

// ═══════════════════════════════════════════════════════════════════
// RenderHandle - Render Side API
// ═══════════════════════════════════════════════════════════════════

impl RenderHandle {
    /// Apply all pending commands from the control side.
    ///
    /// Called at the start of each block.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.command_rx.try_recv() {
            self.engine.apply(command);
            applied += 1;
        }
        applied
    }

    /// Render one interleaved block and publish the new clock position.
    ///
    /// A closed device renders silence and leaves the clock where it is.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        if self.readback.closed.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }

        self.process_commands();
        self.engine.render(out, channels);
        self.sync_readback();
    }

    /// Publish engine state for the control side.
    ///
    /// Called at the end of each block.
    pub fn sync_readback(&self) {
        self.readback
            .active_voices
            .store(self.engine.active_voices() as u64, Ordering::Relaxed);
        self.readback.running.store(true, Ordering::Relaxed);
        self.readback
            .sample_position
            .store(self.engine.sample_position(), Ordering::Release);
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.engine.sample_rate()
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        debug!("Render side dropped at {:.3}s", self.engine.now());
        self.readback.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{GainEvent, GainOp};
    use crate::source::Waveform;
    use crate::voice::VoiceSource;

    #[test]
    fn test_clock_follows_rendered_samples() {
        let (device, mut render) = create_bridge(100.0);
        assert_eq!(device.now(), 0.0);
        assert!(!device.is_running());

        let mut block = [0.0; 50];
        render.render(&mut block, 1);
        assert_eq!(device.now(), 0.5);
        assert!(device.is_running());
    }

    #[test]
    fn test_commands_reach_engine() {
        let (mut device, mut render) = create_bridge(100.0);
        let id = device.allocate_voice();
        device
            .send(Command::StartVoice {
                id,
                source: VoiceSource::Synth {
                    waveform: Waveform::Square,
                    frequency: 1.0,
                },
                at: 0.0,
                initial_gain: 1.0,
            })
            .unwrap();
        device
            .send(Command::MasterGain {
                op: GainOp::Schedule(GainEvent::SetValue {
                    time: 0.0,
                    value: 0.25,
                }),
            })
            .unwrap();

        let mut block = [0.0; 4];
        render.render(&mut block, 1);
        assert_eq!(block, [0.25; 4]);
        assert_eq!(device.active_voices(), 1);
    }

    #[test]
    fn test_voice_ids_are_unique() {
        let (mut device, _render) = create_bridge(100.0);
        let a = device.allocate_voice();
        let b = device.allocate_voice();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dropping_render_side_closes_device() {
        let (device, render) = create_bridge(100.0);
        assert!(!device.is_closed());
        drop(render);
        assert!(device.is_closed());
        assert_eq!(
            device.send(Command::StopVoice { id: 1, at: 0.0 }),
            Err(AudioError::Closed)
        );
    }

    #[test]
    fn test_closed_device_renders_silence() {
        let (device, mut render) = create_bridge(100.0);
        device.close();
        let mut block = [1.0; 8];
        render.render(&mut block, 2);
        assert_eq!(block, [0.0; 8]);
        assert_eq!(device.now(), 0.0);
    }
}
