//! Blocking PCM write interface driven by the playback engine.
//!
//! The vocabulary mirrors a kernel PCM device: writes may be short, an
//! underrun or suspend is reported as an error on the next write, and
//! `prepare` brings the device back to a stopped-but-ready state.

use crate::audio::Frame;
use crate::error::{PcmError, ResumeError};

/// An opened and configured output device
pub trait Pcm {
    /// Queue `frames` for playback, blocking until at least some are accepted.
    ///
    /// Returns how many frames were taken from the front of `frames`.
    fn writei(&mut self, frames: &[Frame]) -> Result<usize, PcmError>;

    /// Drop anything queued and return to the prepared state
    fn prepare(&mut self) -> Result<(), PcmError>;

    /// Leave the suspended state
    fn resume(&mut self) -> Result<(), ResumeError>;

    /// Block until everything queued has been played, then return to the prepared state
    fn drain(&mut self) -> Result<(), PcmError>;

    /// Rate the hardware actually runs at
    fn sample_rate(&self) -> u32;
}
