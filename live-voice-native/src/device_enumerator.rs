//! Audio device enumeration via cpal.
//!
//! Lists capture (microphone) and playback (speaker/headphone) devices of
//! the default host. cpal exposes no stable device id, so the device name
//! doubles as the id.

use cpal::traits::{DeviceTrait, HostTrait};

use live_voice_core::models::audio_models::{AudioDeviceInfo, DeviceDirection};
use live_voice_core::models::error::SessionError;

/// Audio device enumerator over the default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List capture (microphone) devices.
    pub fn list_capture_devices(&self) -> Result<Vec<AudioDeviceInfo>, SessionError> {
        let default_name = self.default_capture_device_name();
        let devices = self
            .host
            .input_devices()
            .map_err(|e| SessionError::Unknown(format!("failed to list input devices: {}", e)))?;
        Ok(collect_devices(devices, DeviceDirection::Input, default_name))
    }

    /// List playback devices.
    pub fn list_render_devices(&self) -> Result<Vec<AudioDeviceInfo>, SessionError> {
        let default_name = self.default_render_device_name();
        let devices = self
            .host
            .output_devices()
            .map_err(|e| SessionError::Unknown(format!("failed to list output devices: {}", e)))?;
        Ok(collect_devices(devices, DeviceDirection::Output, default_name))
    }

    /// Capture devices followed by playback devices.
    pub fn list_all(&self) -> Result<Vec<AudioDeviceInfo>, SessionError> {
        let mut devices = self.list_capture_devices()?;
        devices.extend(self.list_render_devices()?);
        Ok(devices)
    }

    /// Name of the host's default microphone, if any.
    pub fn default_capture_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    pub fn default_render_device_name(&self) -> Option<String> {
        self.host.default_output_device().and_then(|d| d.name().ok())
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a device by name, or the host default when `name` is `None`.
pub(crate) fn find_device(
    host: &cpal::Host,
    direction: DeviceDirection,
    name: Option<&str>,
) -> Result<cpal::Device, SessionError> {
    let found = match (direction, name) {
        (DeviceDirection::Input, None) => host.default_input_device(),
        (DeviceDirection::Output, None) => host.default_output_device(),
        (DeviceDirection::Input, Some(name)) => host
            .input_devices()
            .map_err(|e| SessionError::DeviceNotAvailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
        (DeviceDirection::Output, Some(name)) => host
            .output_devices()
            .map_err(|e| SessionError::DeviceNotAvailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
    };

    found.ok_or_else(|| {
        let kind = match direction {
            DeviceDirection::Input => "input",
            DeviceDirection::Output => "output",
        };
        match name {
            Some(name) => SessionError::DeviceNotAvailable(format!("no {} device named {}", kind, name)),
            None => SessionError::DeviceNotAvailable(format!("no {} audio device available", kind)),
        }
    })
}

fn collect_devices(
    devices: impl Iterator<Item = cpal::Device>,
    direction: DeviceDirection,
    default_name: Option<String>,
) -> Vec<AudioDeviceInfo> {
    devices
        .filter_map(|device| device.name().ok())
        .map(|name| device_info(name, direction, default_name.as_deref()))
        .collect()
}

fn device_info(name: String, direction: DeviceDirection, default_name: Option<&str>) -> AudioDeviceInfo {
    AudioDeviceInfo {
        id: name.clone(),
        is_default: default_name == Some(name.as_str()),
        name,
        direction,
    }
}
