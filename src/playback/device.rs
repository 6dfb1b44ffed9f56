//! Output device backed by a cpal stream.
//!
//! cpal pulls audio from a callback thread, while the engine pushes with
//! blocking writes. [`FrameRing`] sits between the two: writes block while
//! it is full, the callback drains it, and running dry while started puts
//! it into the underrun state until the next `prepare`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::cpal::{
    self, BufferSize, BuildStreamError, PlayStreamError, SampleFormat, SampleRate, StreamConfig,
    StreamError,
};
use tracing::{debug, info, instrument, warn};

use crate::audio::{Frame, CHANNELS, SAMPLE_RATE};
use crate::error::{DeviceError, PcmError, ResumeError};

use super::pcm::Pcm;

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub index: usize,
    pub is_default: bool,
}

/// Get list of available audio output devices
pub fn list_audio_devices() -> Result<Vec<AudioDevice>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::Unavailable(format!("failed to enumerate output devices: {}", e)))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| format!("Device {}", index));
            let is_default = default_name.as_deref() == Some(name.as_str());
            AudioDevice {
                name,
                index,
                is_default,
            }
        })
        .collect())
}

/// How to open the output device
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    /// Case-insensitive substring of the device name; default device if unset
    pub name: Option<String>,
    pub sample_rate: u32,
    /// Largest accepted relative deviation of the negotiated rate
    pub rate_tolerance: f64,
    /// Frames queued ahead of the hardware, in milliseconds
    pub buffer_ms: u32,
    /// How long a write or drain waits for the stream before giving up
    pub stall_timeout: Duration,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            name: None,
            sample_rate: SAMPLE_RATE,
            rate_tolerance: 0.005,
            buffer_ms: 100,
            stall_timeout: Duration::from_secs(2),
        }
    }
}

/// Open and configure an output device for interleaved 16-bit stereo.
///
/// Anything opened before a failure is dropped before the error is returned.
#[instrument(skip(request), fields(device = ?request.name, rate = request.sample_rate))]
pub fn open_device(request: &DeviceRequest) -> Result<CpalPcm, DeviceError> {
    let host = cpal::default_host();
    let device = pick_device(&host, request.name.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!(device = %device_name, "Opening audio output");

    let ranges: Vec<(u32, u32)> = device
        .supported_output_configs()
        .map_err(|e| DeviceError::Unavailable(format!("{}: {}", device_name, e)))?
        .filter(|c| c.channels() == CHANNELS && c.sample_format() == SampleFormat::I16)
        .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0))
        .collect();
    debug!(?ranges, "Supported 16-bit stereo rate ranges");

    let sample_rate = negotiate_rate(&ranges, request.sample_rate, request.rate_tolerance)?;
    if sample_rate != request.sample_rate {
        warn!(
            requested = request.sample_rate,
            negotiated = sample_rate,
            "Device does not support the requested rate exactly"
        );
    }

    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    };

    let capacity = ((sample_rate as u64 * request.buffer_ms as u64) / 1000).max(1) as usize;
    let ring = Arc::new(FrameRing::new(capacity));

    let ring_cb = Arc::clone(&ring);
    let ring_err = Arc::clone(&ring);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| ring_cb.render_samples(data),
            move |err: StreamError| {
                warn!(error = %err, "Output stream error");
                ring_err.fault(StreamFault::from(err));
            },
            None,
        )
        .map_err(|e| match e {
            BuildStreamError::DeviceNotAvailable => {
                DeviceError::Unavailable(format!("{} is no longer available", device_name))
            }
            other => DeviceError::ConfigurationRejected(format!("{}: {}", device_name, other)),
        })?;

    stream.play().map_err(|e| {
        DeviceError::ConfigurationRejected(format!("failed to start output stream: {}", e))
    })?;

    info!(device = %device_name, sample_rate, capacity, "Audio output ready");

    Ok(CpalPcm {
        stream,
        ring,
        sample_rate,
        device_name,
        stall_timeout: request.stall_timeout,
    })
}

fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    if let Some(needle) = needle {
        let needle_lc = needle.to_lowercase();
        let mut devices = host
            .output_devices()
            .map_err(|e| DeviceError::Unavailable(format!("failed to enumerate output devices: {}", e)))?;

        return devices
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&needle_lc))
                    .unwrap_or(false)
            })
            .ok_or_else(|| DeviceError::Unavailable(format!("no output device matched: {}", needle)));
    }

    host.default_output_device()
        .ok_or_else(|| DeviceError::Unavailable("no default output device".into()))
}

/// Pick the supported rate closest to `requested`, rejecting it if it is too far off
pub(crate) fn negotiate_rate(
    ranges: &[(u32, u32)],
    requested: u32,
    tolerance: f64,
) -> Result<u32, DeviceError> {
    let negotiated = ranges
        .iter()
        .map(|&(min, max)| requested.clamp(min.min(max), max.max(min)))
        .min_by_key(|rate| rate.abs_diff(requested))
        .ok_or_else(|| {
            DeviceError::ConfigurationRejected(
                "device offers no interleaved 16-bit stereo configuration".into(),
            )
        })?;

    let deviation = negotiated.abs_diff(requested) as f64 / requested as f64;
    if deviation > tolerance {
        return Err(DeviceError::ConfigurationRejected(format!(
            "device runs at {} Hz, requested {} Hz",
            negotiated, requested
        )));
    }

    Ok(negotiated)
}

/// Opened output stream plus the ring feeding it
pub struct CpalPcm {
    stream: cpal::Stream,
    ring: Arc<FrameRing>,
    sample_rate: u32,
    device_name: String,
    stall_timeout: Duration,
}

impl CpalPcm {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Pcm for CpalPcm {
    fn writei(&mut self, frames: &[Frame]) -> Result<usize, PcmError> {
        self.ring.write(frames, self.stall_timeout)
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.ring.prepare()
    }

    fn resume(&mut self) -> Result<(), ResumeError> {
        if !self.ring.is_suspended() {
            return Ok(());
        }

        match self.stream.play() {
            Ok(()) => {
                self.ring.resumed();
                Ok(())
            }
            Err(PlayStreamError::DeviceNotAvailable) => Err(ResumeError::TryAgain),
            Err(err) => Err(ResumeError::Failed(err.to_string())),
        }
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        self.ring.drain(self.stall_timeout)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalPcm {
    fn drop(&mut self) {
        debug!(device = %self.device_name, "Closing audio output");
        if let Err(e) = self.stream.pause() {
            debug!(error = %e, "Failed to pause output stream");
        }
    }
}

/// Stream-level failure reported by the audio backend
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamFault {
    /// Device went away, possibly temporarily
    Unavailable,
    /// Anything else the backend reports
    Backend(String),
}

impl From<StreamError> for StreamFault {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::DeviceNotAvailable => StreamFault::Unavailable,
            other => StreamFault::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RingStatus {
    /// Accepting frames, callback outputs silence
    Prepared,
    /// Callback is consuming frames
    Running,
    /// Callback is consuming the last frames before returning to `Prepared`
    Draining,
    /// Ran dry while running
    Xrun,
    Suspended,
    Failed(String),
}

struct RingState {
    queue: VecDeque<Frame>,
    status: RingStatus,
}

/// Bounded frame queue shared between blocking writes and the output callback
pub(crate) struct FrameRing {
    state: Mutex<RingState>,
    cv: Condvar,
    capacity: usize,
    start_threshold: usize,
}

impl FrameRing {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState {
                queue: VecDeque::with_capacity(capacity),
                status: RingStatus::Prepared,
            }),
            cv: Condvar::new(),
            capacity,
            start_threshold: (capacity / 2).max(1),
        }
    }

    /// Queue as many frames as fit, waiting for room if the ring is full
    pub(crate) fn write(&self, frames: &[Frame], stall_timeout: Duration) -> Result<usize, PcmError> {
        let mut st = self.state.lock();
        loop {
            check_status(&st.status)?;

            let free = self.capacity - st.queue.len();
            if free > 0 {
                let accepted = free.min(frames.len());
                st.queue.extend(frames[..accepted].iter().copied());
                if st.status == RingStatus::Prepared && st.queue.len() >= self.start_threshold {
                    st.status = RingStatus::Running;
                }
                return Ok(accepted);
            }

            if st.status == RingStatus::Prepared {
                st.status = RingStatus::Running;
            }

            let queued = st.queue.len();
            if self.cv.wait_for(&mut st, stall_timeout).timed_out() && st.queue.len() == queued {
                return Err(PcmError::Device("output stream stalled".into()));
            }
        }
    }

    /// Fill `out` from the queue (callback side)
    pub(crate) fn render(&self, out: &mut [Frame]) {
        {
            let mut st = self.state.lock();
            match st.status {
                RingStatus::Running | RingStatus::Draining => {
                    let mut ran_dry = false;
                    for slot in out.iter_mut() {
                        match st.queue.pop_front() {
                            Some(frame) => *slot = frame,
                            None => {
                                *slot = Frame::SILENCE;
                                ran_dry = true;
                            }
                        }
                    }

                    if st.status == RingStatus::Draining {
                        if st.queue.is_empty() {
                            st.status = RingStatus::Prepared;
                        }
                    } else if ran_dry {
                        st.status = RingStatus::Xrun;
                    }
                }
                _ => out.fill(Frame::SILENCE),
            }
        }
        self.cv.notify_all();
    }

    /// Callback entry point for the raw interleaved device buffer
    fn render_samples(&self, data: &mut [i16]) {
        match bytemuck::try_cast_slice_mut::<i16, Frame>(data) {
            Ok(frames) => self.render(frames),
            Err(_) => data.fill(0),
        }
    }

    pub(crate) fn fault(&self, fault: StreamFault) {
        {
            let mut st = self.state.lock();
            st.status = match fault {
                StreamFault::Unavailable => RingStatus::Suspended,
                StreamFault::Backend(msg) => RingStatus::Failed(msg),
            };
        }
        self.cv.notify_all();
    }

    pub(crate) fn prepare(&self) -> Result<(), PcmError> {
        let mut st = self.state.lock();
        if let RingStatus::Failed(msg) = &st.status {
            return Err(PcmError::Device(msg.clone()));
        }
        st.queue.clear();
        st.status = RingStatus::Prepared;
        Ok(())
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.state.lock().status == RingStatus::Suspended
    }

    /// Continue where the suspend interrupted
    pub(crate) fn resumed(&self) {
        let mut st = self.state.lock();
        if st.status == RingStatus::Suspended {
            st.status = if st.queue.is_empty() {
                RingStatus::Prepared
            } else {
                RingStatus::Running
            };
        }
    }

    /// Wait for the callback to play everything queued
    pub(crate) fn drain(&self, stall_timeout: Duration) -> Result<(), PcmError> {
        let mut st = self.state.lock();
        check_status(&st.status)?;

        if st.queue.is_empty() {
            st.status = RingStatus::Prepared;
            return Ok(());
        }

        st.status = RingStatus::Draining;
        while st.status == RingStatus::Draining {
            let queued = st.queue.len();
            if self.cv.wait_for(&mut st, stall_timeout).timed_out() && st.queue.len() == queued {
                st.queue.clear();
                st.status = RingStatus::Prepared;
                return Err(PcmError::Device("output stream stalled while draining".into()));
            }
        }

        check_status(&st.status)
    }
}

fn check_status(status: &RingStatus) -> Result<(), PcmError> {
    match status {
        RingStatus::Xrun => Err(PcmError::Underrun),
        RingStatus::Suspended => Err(PcmError::Suspended),
        RingStatus::Failed(msg) => Err(PcmError::Device(msg.clone())),
        RingStatus::Prepared | RingStatus::Running | RingStatus::Draining => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    fn frames(n: i16) -> Vec<Frame> {
        (1..=n).map(|i| Frame::new(i, -i)).collect()
    }

    fn render(ring: &FrameRing, n: usize) -> Vec<Frame> {
        let mut out = vec![Frame::new(99, 99); n];
        ring.render(&mut out);
        out
    }

    #[test]
    fn test_write_starts_stream_at_threshold() {
        let ring = FrameRing::new(8);

        assert_eq!(ring.write(&frames(3), SHORT).unwrap(), 3);
        assert_eq!(render(&ring, 2), vec![Frame::SILENCE; 2], "not started yet");

        assert_eq!(ring.write(&frames(1), SHORT).unwrap(), 1);
        assert_eq!(render(&ring, 2), frames(2));
    }

    #[test]
    fn test_full_ring_accepts_short_write() {
        let ring = FrameRing::new(4);
        let input = frames(10);

        assert_eq!(ring.write(&input, SHORT).unwrap(), 4);
        assert_eq!(render(&ring, 1), input[..1]);
        assert_eq!(ring.write(&input[4..], SHORT).unwrap(), 1);
        assert_eq!(render(&ring, 4), input[1..5]);
    }

    #[test]
    fn test_running_dry_reports_underrun_until_prepared() {
        let ring = FrameRing::new(4);
        ring.write(&frames(4), SHORT).unwrap();

        let out = render(&ring, 6);
        assert_eq!(out[..4], frames(4)[..]);
        assert_eq!(out[4..], [Frame::SILENCE; 2]);

        assert_eq!(ring.write(&frames(1), SHORT), Err(PcmError::Underrun));
        ring.prepare().unwrap();
        assert_eq!(ring.write(&frames(1), SHORT), Ok(1));
    }

    #[test]
    fn test_unavailable_device_suspends_ring() {
        let ring = FrameRing::new(4);
        ring.write(&frames(4), SHORT).unwrap();
        ring.fault(StreamFault::Unavailable);

        assert!(ring.is_suspended());
        assert_eq!(ring.write(&frames(1), SHORT), Err(PcmError::Suspended));
        assert_eq!(render(&ring, 2), vec![Frame::SILENCE; 2]);

        ring.resumed();
        assert!(!ring.is_suspended());
        assert_eq!(render(&ring, 2), frames(2), "queued frames survive a suspend");
    }

    #[test]
    fn test_backend_fault_is_not_recoverable() {
        let ring = FrameRing::new(4);
        ring.fault(StreamFault::Backend("device disconnected".into()));

        assert_eq!(
            ring.write(&frames(1), SHORT),
            Err(PcmError::Device("device disconnected".into()))
        );
        assert!(ring.prepare().is_err());
    }

    #[test]
    fn test_write_times_out_without_callback() {
        let ring = FrameRing::new(2);
        ring.write(&frames(2), SHORT).unwrap();

        assert_eq!(
            ring.write(&frames(1), SHORT),
            Err(PcmError::Device("output stream stalled".into()))
        );
    }

    #[test]
    fn test_drain_waits_for_callback() {
        let ring = FrameRing::new(8);
        ring.write(&frames(2), SHORT).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..200 {
                    render(&ring, 1);
                    thread::sleep(Duration::from_millis(1));
                }
            });
            ring.drain(Duration::from_secs(2)).unwrap();
        });

        // Drained ring is prepared again: fresh writes are held until the threshold
        ring.write(&frames(1), SHORT).unwrap();
        assert_eq!(render(&ring, 1), vec![Frame::SILENCE]);
    }

    #[test]
    fn test_drain_times_out_without_callback() {
        let ring = FrameRing::new(8);
        ring.write(&frames(2), SHORT).unwrap();

        assert!(ring.drain(SHORT).is_err());
        assert_eq!(ring.write(&frames(1), SHORT), Ok(1));
    }

    #[test]
    fn test_render_samples_interleaves() {
        let ring = FrameRing::new(2);
        ring.write(&[Frame::new(1, 2), Frame::new(3, 4)], SHORT).unwrap();

        let mut data = [0i16; 4];
        ring.render_samples(&mut data);
        assert_eq!(data, [1, 2, 3, 4]);

        let mut odd = [7i16; 3];
        ring.render_samples(&mut odd);
        assert_eq!(odd, [0; 3]);
    }

    #[test]
    fn test_negotiate_exact_rate() {
        let ranges = [(8_000, 44_100), (44_100, 192_000)];
        assert_eq!(negotiate_rate(&ranges, 48_000, 0.0).unwrap(), 48_000);
    }

    #[test]
    fn test_negotiate_close_rate_within_tolerance() {
        let ranges = [(47_999, 47_999)];
        assert_eq!(negotiate_rate(&ranges, 48_000, 0.005).unwrap(), 47_999);
    }

    #[test]
    fn test_negotiate_rejects_distant_rate() {
        let ranges = [(44_100, 44_100)];
        let err = negotiate_rate(&ranges, 48_000, 0.005).unwrap_err();
        assert!(matches!(err, DeviceError::ConfigurationRejected(_)));
    }

    #[test]
    fn test_negotiate_rejects_missing_configuration() {
        let err = negotiate_rate(&[], 48_000, 0.005).unwrap_err();
        assert!(matches!(err, DeviceError::ConfigurationRejected(_)));
    }
}
