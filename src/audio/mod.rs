mod buffer;
mod tone;

pub use buffer::{ChannelBuffer, Frame, RoutingMode, ToneBank, CHANNELS, SAMPLE_RATE};
pub use tone::ToneParameters;
