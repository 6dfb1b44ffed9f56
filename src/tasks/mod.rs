mod channels;
mod reader;
mod shutdown;

pub use channels::{Channels, Shutdown};
pub use reader::spawn_line_reader;
pub use shutdown::install_shutdown_handler;
