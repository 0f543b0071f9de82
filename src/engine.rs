//! Optional device output: a cpal stream that drives the buffer-reader
//! node at the hardware callback rate.
//!
//! Hosts that run their own audio callback can skip this entirely and feed
//! a [`BufferReader`](crate::readback::BufferReader) themselves.

use crate::config::BloomSonicSettings;
use crate::error::{BloomSonicError, Result};
use crate::readback::BufferReader;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Audio engine that owns the output stream and pulls from a buffer reader.
pub struct BloomSonicEngine {
    settings: BloomSonicSettings,
    channels: u16,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
}

impl BloomSonicEngine {
    pub fn new(settings: BloomSonicSettings, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(BloomSonicError::Configuration(
                "engine needs at least one output channel".to_string(),
            ));
        }
        Ok(Self {
            settings: settings.validated()?,
            channels,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the output stream, moving the reader into the audio callback.
    pub fn start(&mut self, reader: BufferReader) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            BloomSonicError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.settings.samples_per_update() as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            BloomSonicError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let is_running = self.is_running.clone();
        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                self.create_stream::<f32>(&device, &config, reader, is_running)?
            }
            cpal::SampleFormat::I16 => {
                self.create_stream::<i16>(&device, &config, reader, is_running)?
            }
            cpal::SampleFormat::U16 => {
                self.create_stream::<u16>(&device, &config, reader, is_running)?
            }
            _ => {
                return Err(BloomSonicError::AudioFormat(
                    "Unsupported sample format".into(),
                ));
            }
        };

        stream.play().map_err(|e| {
            BloomSonicError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "audio engine started: {} Hz, {} channels",
            self.settings.sample_rate,
            self.channels
        );

        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &BloomSonicSettings {
        &self.settings
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut reader: BufferReader,
        is_running: Arc<AtomicBool>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut scratch: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    scratch.resize(data.len(), 0.0);
                    reader.fill(&mut scratch);
                    for (out, &value) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(value);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                BloomSonicError::AudioDevice(format!("Failed to build stream: {}", e))
            })?;

        Ok(stream)
    }
}

impl Drop for BloomSonicEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
