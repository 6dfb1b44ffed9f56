use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::audio::ChannelBuffer;
use crate::error::{PcmError, PlaybackError, ResumeError};

use super::pcm::Pcm;

/// Recovery tuning for the delivery loop
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Sleep between resume polls while the device reports "try again"
    pub resume_poll: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            resume_poll: Duration::from_secs(1),
        }
    }
}

/// What happened while delivering one buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub frames_written: usize,
    pub write_calls: usize,
    pub short_writes: usize,
    pub underruns: usize,
    pub suspends: usize,
}

/// Playback engine owning the output device
pub struct PlaybackEngine<P: Pcm> {
    pcm: P,
    config: PlaybackConfig,
}

impl<P: Pcm> PlaybackEngine<P> {
    /// Create an engine with default recovery settings
    pub fn new(pcm: P) -> Self {
        Self::with_config(pcm, PlaybackConfig::default())
    }

    pub fn with_config(pcm: P, config: PlaybackConfig) -> Self {
        Self { pcm, config }
    }

    /// Rate the device negotiated; buffers must be synthesized at this rate
    pub fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate()
    }

    #[cfg(test)]
    pub fn pcm(&self) -> &P {
        &self.pcm
    }

    /// Write the whole buffer to the device, blocking until it has played.
    ///
    /// Underruns and suspends are recovered by re-preparing the device and
    /// retrying at the same offset, so every frame is delivered exactly once;
    /// they never end delivery. Any other device error, including a failing
    /// `prepare`, aborts it. On success the device is drained and left
    /// prepared for the next call.
    #[instrument(skip(self, buffer), fields(mode = %buffer.mode(), frames = buffer.frame_count()))]
    pub fn play(&mut self, buffer: &ChannelBuffer) -> Result<PlaybackReport, PlaybackError> {
        let frames = buffer.frames();
        let total = frames.len();
        let mut report = PlaybackReport::default();

        debug!(duration_secs = buffer.duration_secs(), "Starting playback");

        while report.frames_written < total {
            let offset = report.frames_written;
            report.write_calls += 1;

            match self.pcm.writei(&frames[offset..]) {
                Ok(accepted) if accepted > 0 => {
                    let accepted = accepted.min(total - offset);
                    if accepted < total - offset {
                        report.short_writes += 1;
                        debug!(offset, accepted, remaining = total - offset - accepted, "Short write");
                    }
                    report.frames_written += accepted;
                }
                Ok(_) => {
                    debug!(offset, "Device accepted no frames");
                }
                Err(PcmError::Underrun) => {
                    report.underruns += 1;
                    warn!(offset, "Buffer underrun, re-preparing device");
                    self.reprepare()?;
                }
                Err(PcmError::Suspended) => {
                    report.suspends += 1;
                    info!(offset, "Device suspended, waiting for resume");
                    self.recover_from_suspend()?;
                }
                Err(err) => {
                    error!(offset, error = %err, "Write failed");
                    return Err(PlaybackError::PlaybackFailed(err.to_string()));
                }
            }
        }

        match self.pcm.drain() {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "Drain interrupted, re-preparing device");
                self.reprepare()?;
            }
            Err(err) => {
                error!(error = %err, "Drain failed");
                return Err(PlaybackError::PlaybackFailed(format!("drain failed: {}", err)));
            }
        }

        info!(
            frames_written = report.frames_written,
            write_calls = report.write_calls,
            short_writes = report.short_writes,
            underruns = report.underruns,
            suspends = report.suspends,
            "Playback complete"
        );

        Ok(report)
    }

    /// Poll for resume while the device asks to try again, re-preparing if
    /// resume fails outright
    fn recover_from_suspend(&mut self) -> Result<(), PlaybackError> {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match self.pcm.resume() {
                Ok(()) => {
                    info!(attempt, "Device resumed");
                    return Ok(());
                }
                Err(ResumeError::TryAgain) => {
                    debug!(attempt, "Device not ready to resume");
                    thread::sleep(self.config.resume_poll);
                }
                Err(ResumeError::Failed(reason)) => {
                    warn!(%reason, "Resume failed, re-preparing device");
                    return self.reprepare();
                }
            }
        }
    }

    fn reprepare(&mut self) -> Result<(), PlaybackError> {
        self.pcm.prepare().map_err(|err| {
            error!(error = %err, "Failed to re-prepare device");
            PlaybackError::PlaybackFailed(format!("failed to re-prepare device: {}", err))
        })
    }
}
