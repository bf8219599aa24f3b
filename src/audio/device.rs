//! Audio device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::AudioError;

/// Description of an audio endpoint on this host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// `input:<name>` or `output:<name>`
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around a cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
    pub is_input: bool,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device, is_input: bool) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
            is_input,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    pub fn default_input_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_input_config()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))
    }

    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))
    }
}

/// List every input and output device on the default host
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = capabilities(&device, true);
                devices.push(DeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_input.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = capabilities(&device, false);
                devices.push(DeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_output.as_ref() == Some(&name),
                    name,
                    is_input: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

fn capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device
            .supported_input_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default()
    } else {
        device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default()
    };

    let mut rates = Vec::new();
    let mut channels = Vec::new();
    for range in &ranges {
        for rate in [16_000u32, 24_000, 44_100, 48_000, 96_000] {
            let sample_rate = cpal::SampleRate(rate);
            if sample_rate >= range.min_sample_rate()
                && sample_rate <= range.max_sample_rate()
                && !rates.contains(&rate)
            {
                rates.push(rate);
            }
        }
        if !channels.contains(&range.channels()) {
            channels.push(range.channels());
        }
    }
    rates.sort_unstable();
    channels.sort_unstable();
    (rates, channels)
}

/// Split `input:<name>` / `output:<name>` ids; bare names are treated as inputs
pub fn parse_device_id(id: &str) -> (bool, &str) {
    if let Some(name) = id.strip_prefix("input:") {
        (true, name)
    } else if let Some(name) = id.strip_prefix("output:") {
        (false, name)
    } else {
        (true, id)
    }
}

/// Find a device by id
pub fn get_device_by_id(id: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    let (is_input, name) = parse_device_id(id);

    let devices = if is_input {
        host.input_devices()
    } else {
        host.output_devices()
    }
    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    devices
        .filter(|device| device.name().map(|n| n == name).unwrap_or(false))
        .map(|device| AudioDevice::from_cpal(device, is_input))
        .next()
        .ok_or_else(|| AudioError::DeviceUnavailable(id.to_string()))
}

/// The configured microphone, or the host default
pub fn input_device(id: Option<&str>) -> Result<AudioDevice, AudioError> {
    match id {
        Some(id) => get_device_by_id(id),
        None => cpal::default_host()
            .default_input_device()
            .map(|d| AudioDevice::from_cpal(d, true))
            .ok_or_else(|| AudioError::DeviceUnavailable("No default input device".to_string())),
    }
}

/// The configured speaker, or the host default
pub fn output_device(id: Option<&str>) -> Result<AudioDevice, AudioError> {
    match id {
        Some(id) => get_device_by_id(id),
        None => cpal::default_host()
            .default_output_device()
            .map(|d| AudioDevice::from_cpal(d, false))
            .ok_or_else(|| AudioError::DeviceUnavailable("No default output device".to_string())),
    }
}
