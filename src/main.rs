mod app;
mod audio;
mod cli;
mod error;
mod playback;
mod tasks;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::app::Session;
use crate::audio::{ToneBank, ToneParameters};
use crate::cli::Args;
use crate::error::Result;
use crate::playback::PlaybackEngine;
use crate::tasks::{Channels, install_shutdown_handler, spawn_line_reader};

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("stereo-test v{} starting", env!("CARGO_PKG_VERSION"));

    match run(args) {
        Ok(()) => {
            info!("stereo-test shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // stdout carries the prompt
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run(args: Args) -> Result<()> {
    if args.list_devices {
        for device in playback::list_audio_devices()? {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("#{}: {}{}", device.index, device.name, marker);
        }
        return Ok(());
    }

    let channels = Channels::new();
    let (line_tx, line_rx, shutdown_tx, shutdown_rx) = channels.split();
    install_shutdown_handler(shutdown_tx)?;

    // Device first: buffers are sized from the rate it negotiates
    let pcm = playback::open_device(&args.device_request())?;
    info!(device = pcm.device_name(), "Using output device");
    let engine = PlaybackEngine::new(pcm);

    let params = ToneParameters::standard().with_sample_rate(engine.sample_rate())?;
    let bank = ToneBank::synthesize(&params)?;
    info!(
        sample_rate = params.sample_rate(),
        frequency = params.frequency(),
        amplitude = params.amplitude(),
        duration_secs = params.duration_secs(),
        frames = bank.frame_count(),
        "Test tones ready"
    );

    spawn_line_reader(io::BufReader::new(io::stdin()), line_tx)?;

    let mut session = Session::new(engine, bank, io::stdout());
    session.banner()?;
    session.run(&line_rx, &shutdown_rx)?;

    Ok(())
}
