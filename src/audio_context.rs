// src/audio_context.rs
//
// The single audio context of a trainer.
//
// The context opens its device lazily on first use and reopens it when the
// device was closed underneath it. Each (re)open starts a new generation;
// the master output and every voice are tagged with the generation they
// were created in, and requests for an older generation are dropped since
// the renderer they addressed no longer exists.

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::automation::{GainEvent, GainOp};
use crate::bridge::{DeviceHandle, RenderHandle, create_bridge};
use crate::error::AudioError;
use crate::event::{Command, VoiceId};

/// Time constant of master-volume changes, in seconds.
pub const VOLUME_TIME_CONSTANT: f64 = 0.01;

/// Opens audio devices for an [`AudioContext`].
pub trait DeviceFactory {
    fn open(&mut self) -> Result<DeviceHandle, AudioError>;
}

impl<F> DeviceFactory for F
where
    F: FnMut() -> Result<DeviceHandle, AudioError>,
{
    fn open(&mut self) -> Result<DeviceHandle, AudioError> {
        self()
    }
}

/// The master gain stage every voice routes through.
///
/// Only valid for the generation of the context that handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterOutput {
    generation: u64,
}

impl MasterOutput {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Lazily opened audio context with one master output.
pub struct AudioContext {
    factory: Box<dyn DeviceFactory>,
    device: Option<DeviceHandle>,
    generation: u64,
    volume: f32,
    warned: bool,
}

impl AudioContext {
    pub fn new(factory: impl DeviceFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            device: None,
            generation: 0,
            volume: 1.0,
            warned: false,
        }
    }

    /// The open device, opening or reopening it when needed.
    fn device(&mut self) -> Result<&mut DeviceHandle, AudioError> {
        let needs_open = self.device.as_ref().is_none_or(DeviceHandle::is_closed);

        if needs_open {
            self.device = None;
            match self.factory.open() {
                Ok(device) => {
                    self.generation += 1;
                    self.warned = false;
                    info!(
                        "Audio device opened at {} Hz (generation {})",
                        device.sample_rate(),
                        self.generation
                    );
                    device.send(Command::MasterGain {
                        op: GainOp::Schedule(GainEvent::SetValue {
                            time: 0.0,
                            value: self.volume,
                        }),
                    })?;
                    self.device = Some(device);
                }
                Err(err) => {
                    if !self.warned {
                        warn!("Audio unavailable: {err}");
                        self.warned = true;
                    }
                    return Err(err);
                }
            }
        }

        self.device.as_mut().ok_or(AudioError::Closed)
    }

    /// Whether a device is (or can be) open.
    pub fn is_available(&mut self) -> bool {
        self.device().is_ok()
    }

    /// Current audio-clock time in seconds. Reads 0 while no device can be
    /// opened, so scheduling arithmetic still works relative to it.
    pub fn now(&mut self) -> f64 {
        self.device().map(|d| d.now()).unwrap_or(0.0)
    }

    /// The master output of the current generation.
    pub fn master_output(&mut self) -> Result<MasterOutput, AudioError> {
        self.device()?;
        Ok(MasterOutput {
            generation: self.generation,
        })
    }

    /// Reserve a voice id routed through the current master output.
    pub fn allocate_voice(&mut self) -> Result<(MasterOutput, VoiceId), AudioError> {
        let id = self.device()?.allocate_voice();
        Ok((
            MasterOutput {
                generation: self.generation,
            },
            id,
        ))
    }

    /// Send a command on behalf of `output`.
    ///
    /// Requests for an older generation are dropped without error: the
    /// voices they addressed went away with the old device.
    pub fn send(&mut self, output: MasterOutput, command: Command) -> Result<(), AudioError> {
        let generation = self.generation;
        let device = self.device()?;
        if output.generation != generation {
            return Ok(());
        }
        device.send(command)
    }

    /// Move the master volume towards `volume` with a short exponential
    /// approach instead of a jump.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.volume = volume;
        let master = self.master_output()?;
        let now = self.now();
        self.send(
            master,
            Command::MasterGain {
                op: GainOp::Schedule(GainEvent::SetTarget {
                    time: now,
                    target: volume,
                    time_constant: VOLUME_TIME_CONSTANT,
                }),
            },
        )
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Close the current device. The next access opens a new one.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            device.close();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Loopback devices
// ═══════════════════════════════════════════════════════════════════

/// Shared parking spot for the render side of the current device.
///
/// Output callbacks (a sound card stream, an AudioWorklet, an offline
/// WAV writer, tests) pull audio from here.
#[derive(Clone, Default)]
pub struct RenderSlot {
    inner: Arc<Mutex<Option<RenderHandle>>>,
}

impl RenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parked render side, dropping (and so closing) any
    /// previous one.
    pub fn install(&self, render: RenderHandle) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(render);
    }

    /// Render one interleaved block, or silence when nothing is parked.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_mut() {
            Some(render) => render.render(out, channels),
            None => out.fill(0.0),
        }
    }

    /// Drop the parked render side, closing its device.
    pub fn clear(&self) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slot.take();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// Device factory that parks every new render side in a [`RenderSlot`].
pub struct LoopbackFactory {
    sample_rate: f64,
    slot: RenderSlot,
}

impl LoopbackFactory {
    pub fn new(sample_rate: f64, slot: RenderSlot) -> Self {
        Self { sample_rate, slot }
    }
}

impl DeviceFactory for LoopbackFactory {
    fn open(&mut self) -> Result<DeviceHandle, AudioError> {
        let (device, render) = create_bridge(self.sample_rate);
        self.slot.install(render);
        Ok(device)
    }
}

/// Factory for environments without audio output.
pub fn unavailable(reason: &str) -> impl DeviceFactory + 'static {
    let reason = reason.to_string();
    move || -> Result<DeviceHandle, AudioError> { Err(AudioError::Unavailable(reason.clone())) }
}
