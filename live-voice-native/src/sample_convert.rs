//! Conversions between cpal sample formats and normalized f32.

pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

pub fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32768.0) / 32768.0
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn f32_to_u16(sample: f32) -> u16 {
    (sample * 32768.0 + 32768.0).clamp(0.0, u16::MAX as f32) as u16
}
