use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crossbeam_channel::{select, Receiver};
use tracing::{debug, error, info};

use crate::audio::{RoutingMode, ToneBank};
use crate::error::Result;
use crate::playback::{Pcm, PlaybackEngine};
use crate::tasks::Shutdown;

/// One line typed at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play(RoutingMode),
    Quit,
}

/// Input that is not a known command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCommand(pub String);

impl fmt::Display for InvalidCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid command: '{}'", self.0)
    }
}

impl FromStr for Command {
    type Err = InvalidCommand;

    /// Single case-insensitive letter, surrounding whitespace ignored
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "l" => Ok(Command::Play(RoutingMode::Left)),
            "r" => Ok(Command::Play(RoutingMode::Right)),
            "d" => Ok(Command::Play(RoutingMode::Dual)),
            "q" => Ok(Command::Quit),
            _ => Err(InvalidCommand(trimmed.to_string())),
        }
    }
}

/// Why the session loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    EndOfInput,
    Shutdown,
}

/// Counters reported when the session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub played: usize,
    pub failed: usize,
    pub invalid: usize,
    pub stop_reason: StopReason,
}

enum Input {
    Line(String),
    Closed,
    Shutdown,
}

/// Interactive loop dispatching prompt commands to the playback engine
pub struct Session<P: Pcm, W: Write> {
    engine: PlaybackEngine<P>,
    bank: ToneBank,
    out: W,
    running: bool,
}

impl<P: Pcm, W: Write> Session<P, W> {
    pub fn new(engine: PlaybackEngine<P>, bank: ToneBank, out: W) -> Self {
        Self {
            engine,
            bank,
            out,
            running: true,
        }
    }

    /// Print the command list
    pub fn banner(&mut self) -> Result<()> {
        writeln!(self.out, "pid: {}", std::process::id())?;
        writeln!(
            self.out,
            "{} Hz output, {:.1} s tone per command",
            self.engine.sample_rate(),
            self.bank.get(RoutingMode::Dual).duration_secs()
        )?;
        writeln!(self.out, "(q) to quit")?;
        writeln!(self.out, "(l) for left channel")?;
        writeln!(self.out, "(r) for right channel")?;
        writeln!(self.out, "(d) for both channels")?;
        Ok(())
    }

    /// Run until quit, end of input or shutdown.
    ///
    /// A shutdown request is only observed between commands; a playback in
    /// progress always completes first.
    pub fn run(
        &mut self,
        lines: &Receiver<String>,
        shutdown: &Receiver<Shutdown>,
    ) -> Result<SessionSummary> {
        let mut summary = SessionSummary {
            played: 0,
            failed: 0,
            invalid: 0,
            stop_reason: StopReason::Quit,
        };

        while self.running {
            if shutdown.try_recv().is_ok() {
                writeln!(self.out, "Caught termination signal, exiting")?;
                summary.stop_reason = StopReason::Shutdown;
                break;
            }

            write!(self.out, "> ")?;
            self.out.flush()?;

            let next = select! {
                recv(lines) -> line => line.map_or(Input::Closed, Input::Line),
                recv(shutdown) -> _ => Input::Shutdown,
            };

            let line = match next {
                Input::Line(line) => line,
                Input::Closed => {
                    writeln!(self.out)?;
                    summary.stop_reason = StopReason::EndOfInput;
                    break;
                }
                Input::Shutdown => {
                    writeln!(self.out)?;
                    writeln!(self.out, "Caught termination signal, exiting")?;
                    summary.stop_reason = StopReason::Shutdown;
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Command>() {
                Ok(Command::Quit) => {
                    debug!("Quit requested");
                    self.running = false;
                    summary.stop_reason = StopReason::Quit;
                }
                Ok(Command::Play(mode)) => {
                    if self.play(mode)? {
                        summary.played += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(invalid) => {
                    summary.invalid += 1;
                    writeln!(self.out, "{}", invalid)?;
                }
            }
        }

        self.running = false;
        info!(
            played = summary.played,
            failed = summary.failed,
            reason = ?summary.stop_reason,
            "Session finished"
        );
        Ok(summary)
    }

    /// Play one buffer, reporting failure to the operator without ending the session
    fn play(&mut self, mode: RoutingMode) -> Result<bool> {
        let label = match mode {
            RoutingMode::Left => "left channel",
            RoutingMode::Right => "right channel",
            RoutingMode::Dual => "both channels",
        };
        writeln!(self.out, "Playing {}...", label)?;
        self.out.flush()?;

        match self.engine.play(self.bank.get(mode)) {
            Ok(_) => Ok(true),
            Err(e) => {
                error!(%mode, error = %e, "Playback failed");
                writeln!(self.out, "{}", e)?;
                Ok(false)
            }
        }
    }

    #[cfg(test)]
    fn engine(&self) -> &PlaybackEngine<P> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::{bounded, unbounded, Sender};

    use super::*;
    use crate::audio::ToneParameters;
    use crate::error::PcmError;
    use crate::playback::fake::{FakePcm, Step};
    use crate::playback::PlaybackConfig;

    const RATE: u32 = 1_000;

    fn session(pcm: FakePcm) -> Session<FakePcm, Vec<u8>> {
        let bank = ToneBank::synthesize(&ToneParameters::new(RATE, 50.0, 20_000, 1).unwrap()).unwrap();
        let engine = PlaybackEngine::with_config(
            pcm,
            PlaybackConfig {
                resume_poll: Duration::ZERO,
            },
        );
        Session::new(engine, bank, Vec::new())
    }

    fn input(lines: &[&str]) -> Receiver<String> {
        let (tx, rx) = unbounded();
        for line in lines {
            tx.send(line.to_string()).unwrap();
        }
        rx
    }

    fn no_shutdown() -> (Sender<Shutdown>, Receiver<Shutdown>) {
        bounded(1)
    }

    fn output(session: &Session<FakePcm, Vec<u8>>) -> String {
        String::from_utf8(session.out.clone()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("l".parse::<Command>(), Ok(Command::Play(RoutingMode::Left)));
        assert_eq!("R".parse::<Command>(), Ok(Command::Play(RoutingMode::Right)));
        assert_eq!("  d\t".parse::<Command>(), Ok(Command::Play(RoutingMode::Dual)));
        assert_eq!("Q\r".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_other_input() {
        assert_eq!("x".parse::<Command>(), Err(InvalidCommand("x".into())));
        assert_eq!(" lr ".parse::<Command>(), Err(InvalidCommand("lr".into())));
        assert_eq!("left".parse::<Command>(), Err(InvalidCommand("left".into())));
        assert_eq!(
            InvalidCommand("x".into()).to_string(),
            "Invalid command: 'x'"
        );
    }

    #[test]
    fn test_invalid_command_does_not_touch_device() {
        let mut session = session(FakePcm::new(RATE));
        let (_tx, shutdown) = no_shutdown();

        let summary = session.run(&input(&["x", "q"]), &shutdown).unwrap();

        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.played, 0);
        assert_eq!(session.engine().pcm().write_calls(), 0);
        let out = output(&session);
        assert!(out.contains("Invalid command: 'x'"));
        assert_eq!(out.matches("> ").count(), 2, "prompted again after invalid input");
    }

    #[test]
    fn test_plays_selected_buffers() {
        let mut session = session(FakePcm::new(RATE));
        let (_tx, shutdown) = no_shutdown();

        let summary = session.run(&input(&["l", " R", "", "d", "q", "l"]), &shutdown).unwrap();

        assert_eq!(summary.played, 3);
        assert_eq!(summary.stop_reason, StopReason::Quit);

        let pcm = session.engine().pcm();
        assert_eq!(pcm.written.len(), 3_000);
        assert_eq!(&pcm.written[..1_000], session.bank.get(RoutingMode::Left).frames());
        assert_eq!(&pcm.written[1_000..2_000], session.bank.get(RoutingMode::Right).frames());
        assert_eq!(&pcm.written[2_000..], session.bank.get(RoutingMode::Dual).frames());

        let out = output(&session);
        assert!(out.contains("Playing left channel..."));
        assert!(out.contains("Playing right channel..."));
        assert!(out.contains("Playing both channels..."));
    }

    #[test]
    fn test_dual_buffer_plays_twice() {
        let mut session = session(FakePcm::new(RATE));
        let (_tx, shutdown) = no_shutdown();

        let summary = session.run(&input(&["d", "d", "q"]), &shutdown).unwrap();

        assert_eq!(summary.played, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(session.engine().pcm().drain_calls, 2);
    }

    #[test]
    fn test_playback_failure_keeps_session_running() {
        let pcm = FakePcm::with_script(RATE, [Step::Fail(PcmError::Device("Input/output error".into()))]);
        let mut session = session(pcm);
        let (_tx, shutdown) = no_shutdown();

        let summary = session.run(&input(&["l", "l", "q"]), &shutdown).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.played, 1);
        assert!(output(&session).contains("Playback failed: Input/output error"));
    }

    #[test]
    fn test_end_of_input_stops_session() {
        let mut session = session(FakePcm::new(RATE));
        let (_tx, shutdown) = no_shutdown();

        let summary = session.run(&input(&["l"]), &shutdown).unwrap();

        assert_eq!(summary.played, 1);
        assert_eq!(summary.stop_reason, StopReason::EndOfInput);
    }

    #[test]
    fn test_pending_shutdown_stops_before_next_command() {
        let mut session = session(FakePcm::new(RATE));
        let (tx, shutdown) = no_shutdown();
        tx.send(Shutdown).unwrap();

        let summary = session.run(&input(&["l", "q"]), &shutdown).unwrap();

        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert_eq!(summary.played, 0);
        assert_eq!(session.engine().pcm().write_calls(), 0);
        assert!(output(&session).contains("Caught termination signal, exiting"));
    }

    #[test]
    fn test_shutdown_while_waiting_for_input() {
        let mut session = session(FakePcm::new(RATE));
        let (tx, shutdown) = no_shutdown();
        let (_line_tx, lines) = unbounded::<String>();

        let signal = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(Shutdown).unwrap();
        });
        let summary = session.run(&lines, &shutdown).unwrap();
        signal.join().unwrap();

        assert_eq!(summary.stop_reason, StopReason::Shutdown);
        assert!(output(&session).ends_with("> \nCaught termination signal, exiting\n"));
    }

    #[test]
    fn test_banner_lists_commands() {
        let mut session = session(FakePcm::new(RATE));
        session.banner().unwrap();

        let out = output(&session);
        assert!(out.contains("1000 Hz output"));
        assert!(out.contains("(q) to quit"));
        assert!(out.contains("(d) for both channels"));
    }
}
