use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

/// Forward lines from `reader` to `line_tx` on a dedicated thread.
///
/// The sender is dropped at end of input or on a read error, which the
/// session sees as a disconnected channel.
pub fn spawn_line_reader<R>(reader: R, line_tx: Sender<String>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("input-reader".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            debug!("Session gone, stopping input reader");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        return;
                    }
                }
            }
            debug!("End of input");
        })
}
