use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::ToneError;

use super::tone::ToneParameters;

/// Standard sample rate requested from the device
pub const SAMPLE_RATE: u32 = 48_000;

/// Number of audio channels (stereo)
pub const CHANNELS: u16 = 2;

/// One interleaved stereo frame, laid out exactly as the device expects it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    pub const SILENCE: Frame = Frame { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }
}

/// Which channel(s) carry the tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingMode {
    Left,
    Right,
    Dual,
}

impl RoutingMode {
    #[cfg(test)]
    pub const ALL: [RoutingMode; 3] = [RoutingMode::Left, RoutingMode::Right, RoutingMode::Dual];

    /// Place a tone sample on the channel(s) this mode routes to
    pub fn route(self, sample: i16) -> Frame {
        match self {
            RoutingMode::Left => Frame::new(sample, 0),
            RoutingMode::Right => Frame::new(0, sample),
            RoutingMode::Dual => Frame::new(sample, sample),
        }
    }

    fn index(self) -> usize {
        match self {
            RoutingMode::Left => 0,
            RoutingMode::Right => 1,
            RoutingMode::Dual => 2,
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoutingMode::Left => "left",
            RoutingMode::Right => "right",
            RoutingMode::Dual => "dual",
        })
    }
}

/// Immutable tone buffer for one routing mode
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    mode: RoutingMode,
    frames: Box<[Frame]>,
    sample_rate: u32,
}

impl ChannelBuffer {
    /// Synthesize the buffer for `mode`.
    ///
    /// Frame storage is reserved up front so an allocation failure surfaces as
    /// an error instead of aborting the process.
    pub fn synthesize(params: &ToneParameters, mode: RoutingMode) -> Result<Self, ToneError> {
        let count = params.frame_count();

        let mut frames = Vec::new();
        frames
            .try_reserve_exact(count)
            .map_err(|source| ToneError::AllocationFailure {
                mode,
                frames: count,
                source,
            })?;
        frames.extend((0..count).map(|i| mode.route(params.sample(i))));

        Ok(Self {
            mode,
            frames: frames.into_boxed_slice(),
            sample_rate: params.sample_rate(),
        })
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Interleaved view: left, right, left, right, ...
    #[cfg(test)]
    pub fn samples(&self) -> &[i16] {
        bytemuck::cast_slice(&self.frames)
    }

    #[cfg(test)]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f32 {
        self.frames.len() as f32 / self.sample_rate as f32
    }
}

/// The three pre-synthesized buffers of a session, one per routing mode
#[derive(Debug)]
pub struct ToneBank {
    buffers: [ChannelBuffer; 3],
}

impl ToneBank {
    /// Synthesize every routing mode from the same tone.
    ///
    /// If one allocation fails the buffers already built are dropped before
    /// the error is returned.
    pub fn synthesize(params: &ToneParameters) -> Result<Self, ToneError> {
        let left = ChannelBuffer::synthesize(params, RoutingMode::Left)?;
        let right = ChannelBuffer::synthesize(params, RoutingMode::Right)?;
        let dual = ChannelBuffer::synthesize(params, RoutingMode::Dual)?;

        Ok(Self {
            buffers: [left, right, dual],
        })
    }

    pub fn get(&self, mode: RoutingMode) -> &ChannelBuffer {
        &self.buffers[mode.index()]
    }

    /// Frames per buffer (identical for every mode)
    pub fn frame_count(&self) -> usize {
        self.buffers[0].frame_count()
    }
}
