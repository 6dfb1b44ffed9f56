use std::f64::consts::PI;

use crate::error::ToneError;

use super::buffer::SAMPLE_RATE;

/// Test tone frequency (A4)
pub const FREQUENCY_HZ: f64 = 440.0;

/// Peak amplitude, below full scale to leave headroom
pub const AMPLITUDE: i16 = 30_000;

/// Length of each test tone
pub const DURATION_SECS: u32 = 1;

/// Fixed parameters of the test tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParameters {
    sample_rate: u32,
    frequency: f64,
    amplitude: i16,
    duration_secs: u32,
}

impl ToneParameters {
    /// Validate and build tone parameters
    pub fn new(
        sample_rate: u32,
        frequency: f64,
        amplitude: i16,
        duration_secs: u32,
    ) -> Result<Self, ToneError> {
        if sample_rate == 0 {
            return Err(ToneError::InvalidParameters("sample rate must be positive".into()));
        }
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ToneError::InvalidParameters(format!(
                "frequency must be positive, got {}",
                frequency
            )));
        }
        if amplitude < 0 {
            return Err(ToneError::InvalidParameters(format!(
                "amplitude must not be negative, got {}",
                amplitude
            )));
        }
        if duration_secs == 0 {
            return Err(ToneError::InvalidParameters("duration must be positive".into()));
        }
        if (sample_rate as usize).checked_mul(duration_secs as usize).is_none() {
            return Err(ToneError::InvalidParameters(format!(
                "{} Hz for {} s does not fit in a frame count",
                sample_rate, duration_secs
            )));
        }

        Ok(Self {
            sample_rate,
            frequency,
            amplitude,
            duration_secs,
        })
    }

    /// 440 Hz at 30000 peak for one second at the standard rate
    pub fn standard() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frequency: FREQUENCY_HZ,
            amplitude: AMPLITUDE,
            duration_secs: DURATION_SECS,
        }
    }

    /// Same tone at the rate the device actually negotiated
    pub fn with_sample_rate(self, sample_rate: u32) -> Result<Self, ToneError> {
        Self::new(sample_rate, self.frequency, self.amplitude, self.duration_secs)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn amplitude(&self) -> i16 {
        self.amplitude
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Frames per buffer: `sample_rate * duration`, checked in [`ToneParameters::new`]
    pub fn frame_count(&self) -> usize {
        self.sample_rate as usize * self.duration_secs as usize
    }

    /// Tone sample at frame `index`, truncated toward zero
    pub fn sample(&self, index: usize) -> i16 {
        let phase = 2.0 * PI * self.frequency * index as f64 / self.sample_rate as f64;
        (phase.sin() * self.amplitude as f64) as i16
    }
}

impl Default for ToneParameters {
    fn default() -> Self {
        Self::standard()
    }
}
