// src/output.rs
//
// Sound-card output (feature `native`).
//
// Pulls audio from a RenderSlot inside the cpal callback. The slot is
// empty until the audio context first opens its device, and is refilled
// whenever the context reopens it; until then the callback writes silence.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use crate::audio_context::RenderSlot;
use crate::error::AudioError;

/// A running output stream on the default device.
pub struct LiveOutput {
    _stream: cpal::Stream,
    sample_rate: f64,
    channels: usize,
}

impl LiveOutput {
    /// Open the default output device and start pulling from `slot`.
    pub fn open(slot: RenderSlot) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Unavailable("no default output device".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|err| AudioError::Unavailable(err.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::Unavailable(format!(
                "unsupported sample format {}",
                supported.sample_format()
            )));
        }

        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as f64;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    slot.render(data, channels);
                },
                move |err| {
                    error!("Output stream error: {err}");
                },
                None,
            )
            .map_err(|err| AudioError::Unavailable(err.to_string()))?;
        stream
            .play()
            .map_err(|err| AudioError::Unavailable(err.to_string()))?;

        info!(
            "Output on {} at {} Hz, {} channels",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate,
            channels
        );

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }
}
