use crossbeam_channel::{Sender, TrySendError};
use tracing::info;

use super::channels::Shutdown;

/// Post a [`Shutdown`] on SIGINT/SIGTERM.
///
/// The handler never touches the audio device; the session picks the request
/// up between commands.
pub fn install_shutdown_handler(shutdown_tx: Sender<Shutdown>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || match shutdown_tx.try_send(Shutdown) {
        Ok(()) => info!("Received termination signal, shutting down..."),
        Err(TrySendError::Full(_)) => {}
        Err(TrySendError::Disconnected(_)) => std::process::exit(130),
    })
}
