use clap::Parser;

use crate::playback::DeviceRequest;

#[derive(Parser, Debug, Clone)]
#[command(name = "stereo-test")]
#[command(about = "Play a test tone on the left, right or both channels")]
#[command(version)]
pub struct Args {
    // Device
    /// Use a specific output device by name substring
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Accepted relative deviation of the negotiated sample rate
    #[arg(long, default_value = "0.005", value_parser = parse_tolerance)]
    pub rate_tolerance: f64,

    /// Audio queued ahead of the device (milliseconds)
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(10..=2000))]
    pub buffer_ms: u32,

    // Debug
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Device settings requested on the command line
    pub fn device_request(&self) -> DeviceRequest {
        DeviceRequest {
            name: self.device.clone(),
            rate_tolerance: self.rate_tolerance,
            buffer_ms: self.buffer_ms,
            ..DeviceRequest::default()
        }
    }
}

fn parse_tolerance(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=0.1).contains(&value) {
        return Err(format!("tolerance must be between 0 and 0.1, got {}", value));
    }
    Ok(value)
}
