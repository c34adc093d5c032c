/// Sensor sampling seam and the sensor summary text.
use crate::comm::{status_text, StatusText};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent
    pub moisture: f32,
}

impl SensorSample {
    /// Text for the sensor summary endpoint, e.g. `T:23.5C M:41.0%`
    pub fn summary(&self) -> StatusText {
        status_text(format_args!("T:{:.1}C M:{:.1}%", self.temperature, self.moisture))
    }
}

pub trait SensorSource {
    fn sample(&mut self) -> SensorSample;
}

/// Linear map of a raw ADC count onto `lo..=hi`, clamped.
pub fn scale_raw(raw: u16, full_scale: u16, lo: f32, hi: f32) -> f32 {
    if full_scale == 0 {
        return lo;
    }
    let ratio = raw.min(full_scale) as f32 / full_scale as f32;
    lo + ratio * (hi - lo)
}

#[cfg(test)]
pub mod mock {
    use super::{SensorSample, SensorSource};

    pub struct FixedSensor(pub SensorSample);

    impl SensorSource for FixedSensor {
        fn sample(&mut self) -> SensorSample {
            self.0
        }
    }
}
