use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Request to end the session, posted by the signal handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown;

/// Channel bundle for communication with the session
pub struct Channels {
    /// Lines typed at the prompt; disconnects at end of input
    pub line_tx: Sender<String>,
    pub line_rx: Receiver<String>,

    /// Shutdown requests
    pub shutdown_tx: Sender<Shutdown>,
    pub shutdown_rx: Receiver<Shutdown>,
}

impl Channels {
    pub fn new() -> Self {
        let (line_tx, line_rx) = unbounded();
        // One pending request is enough; repeated signals are coalesced
        let (shutdown_tx, shutdown_rx) = bounded(1);

        Self {
            line_tx,
            line_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Split into sender/receiver pairs
    pub fn split(
        self,
    ) -> (
        Sender<String>,
        Receiver<String>,
        Sender<Shutdown>,
        Receiver<Shutdown>,
    ) {
        (self.line_tx, self.line_rx, self.shutdown_tx, self.shutdown_rx)
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
