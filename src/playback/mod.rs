mod device;
mod engine;
mod pcm;

pub use device::{list_audio_devices, open_device, DeviceRequest};
pub use engine::PlaybackEngine;
pub use pcm::Pcm;

#[cfg(test)]
pub use engine::PlaybackConfig;
#[cfg(test)]
pub use pcm::fake;
