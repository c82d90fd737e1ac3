use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{error, info, warn};

use crate::audio::engine::{BlockRenderer, PlaybackEngine};
use crate::error::AudioError;

/// Name and default format of one output device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescription {
    pub name: String,
    pub default_sample_rate: u32,
    pub channels: u16,
    pub is_current: bool,
}

/// Output device enumeration and selection
pub struct DeviceManager {
    host: Host,
    current_device: Option<Device>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            current_device: None,
        }
    }

    fn output_devices(&self) -> Result<Vec<Device>, AudioError> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.collect())
    }

    /// Names of every output device the host reports
    pub fn list_devices(&self) -> Result<Vec<String>, AudioError> {
        Ok(self
            .output_devices()?
            .iter()
            .filter_map(|device| device.name().ok())
            .collect())
    }

    pub fn describe_devices(&self) -> Result<Vec<DeviceDescription>, AudioError> {
        let current = self.current_device_name();
        let mut descriptions = Vec::new();
        for device in self.output_devices()? {
            let Ok(name) = device.name() else {
                continue;
            };
            let Ok(config) = device.default_output_config() else {
                continue;
            };
            descriptions.push(DeviceDescription {
                is_current: current.as_deref() == Some(name.as_str()),
                name,
                default_sample_rate: config.sample_rate().0,
                channels: config.channels(),
            });
        }
        Ok(descriptions)
    }

    /// Select a device by name, or the default one
    pub fn select_device(&mut self, device_name: Option<&str>) -> Result<(), AudioError> {
        match device_name {
            Some(name) => {
                let device = self
                    .output_devices()?
                    .into_iter()
                    .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| AudioError::DeviceNotFound {
                        device: name.to_string(),
                    })?;
                self.current_device = Some(device);
                Ok(())
            }
            None => self.select_default_device(),
        }
    }

    /// Select a device by name, falling back to the default device when it is missing
    pub fn select_device_with_fallback(&mut self, device_name: Option<&str>) -> Result<(), AudioError> {
        match self.select_device(device_name) {
            Err(AudioError::DeviceNotFound { device }) => {
                warn!("Output device '{}' not found, using the default device", device);
                self.select_default_device()
            }
            other => other,
        }
    }

    pub fn select_default_device(&mut self) -> Result<(), AudioError> {
        let default_device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))?;

        self.current_device = Some(default_device);
        Ok(())
    }

    pub fn current_device(&self) -> Option<&Device> {
        self.current_device.as_ref()
    }

    pub fn current_device_name(&self) -> Option<String> {
        self.current_device.as_ref().and_then(|device| device.name().ok())
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A running cpal output stream that pulls from the engine's renderer
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the currently selected device, size the engine for it and start the stream
    pub fn start(devices: &DeviceManager, engine: &PlaybackEngine, block_frames: usize) -> Result<Self, AudioError> {
        let device = devices
            .current_device()
            .ok_or_else(|| AudioError::InitializationFailed("No device selected".to_string()))?;
        let device_name = devices.current_device_name().unwrap_or_else(|| "unknown device".to_string());

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;
        let config: StreamConfig = default_config.config();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        engine.prepare_to_play(block_frames, sample_rate, channels as usize);
        let renderer = engine.renderer();

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(device, &config, renderer, block_frames)?,
            SampleFormat::I16 => build_stream::<i16>(device, &config, renderer, block_frames)?,
            SampleFormat::U16 => build_stream::<u16>(device, &config, renderer, block_frames)?,
            sample_format => {
                return Err(AudioError::UnsupportedFormat {
                    format: format!("device sample format {:?}", sample_format),
                });
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start output stream: {}", e)))?;

        info!("Output started on {} ({} Hz, {} channels)", device_name, sample_rate, channels);

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
            channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    renderer: Arc<Mutex<BlockRenderer>>,
    block_frames: usize,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    // Sized for several device periods up front so the callback does not allocate
    let mut scratch = vec![0.0f32; block_frames.max(1) * channels * 8];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let block = &mut scratch[..data.len()];
                match renderer.try_lock() {
                    Ok(mut renderer) => renderer.render(block),
                    Err(_) => block.fill(0.0),
                }
                write_samples(data, block);
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Convert rendered f32 samples into the device's sample type
fn write_samples<T>(data: &mut [T], block: &[f32])
where
    T: SizedSample + FromSample<f32>,
{
    for (out, sample) in data.iter_mut().zip(block) {
        *out = T::from_sample(*sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_samples_converts_formats() {
        let block = [0.0f32, 1.0, -1.0];

        let mut floats = [9.0f32; 3];
        write_samples(&mut floats, &block);
        assert_eq!(floats, block);

        let mut ints = [0i16; 3];
        write_samples(&mut ints, &block);
        assert_eq!(ints[0], 0);
        assert_eq!(ints[1], i16::MAX);
        assert_eq!(ints[2], i16::MIN);
    }

    #[test]
    fn test_unsigned_output_is_centered() {
        let mut out = [0u16; 1];
        write_samples(&mut out, &[0.0]);
        assert_eq!(out[0], 32768);
    }

    #[test]
    fn test_start_requires_selected_device() {
        let devices = DeviceManager::new();
        let engine = PlaybackEngine::with_tag_fallback(
            &crate::config::PlayerConfig::default(),
            Box::new(crate::audio::tags::NoTagFallback),
        );
        match AudioOutput::start(&devices, &engine, 512) {
            Err(AudioError::InitializationFailed(message)) => assert!(message.contains("No device selected")),
            _ => panic!("expected InitializationFailed"),
        }
    }
}
