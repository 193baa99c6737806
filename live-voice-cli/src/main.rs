mod console_delegate;
mod env_config;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{bail, Context};

use live_voice_core::{LiveSession, SessionState};
use live_voice_native::{CpalInputDevice, CpalOutputDevice, DeviceEnumerator, WebSocketConnector};

use console_delegate::ConsoleDelegate;

const USAGE: &str = "usage: live-voice [devices | run [--input NAME] [--output NAME]]";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("devices") => list_devices(),
        None | Some("run") => run(args.collect()),
        Some("-h" | "--help") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = DeviceEnumerator::new();
    for device in enumerator.list_all().context("failed to list audio devices")? {
        println!(
            "{:?}\t{}{}",
            device.direction,
            device.name,
            if device.is_default { " (default)" } else { "" }
        );
    }
    Ok(())
}

fn run(args: Vec<String>) -> anyhow::Result<()> {
    let mut input = CpalInputDevice::default_device();
    let mut output = CpalOutputDevice::default_device();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" => {
                let name = args.next().context("--input needs a device name")?;
                input = CpalInputDevice::with_device(name);
            }
            "--output" => {
                let name = args.next().context("--output needs a device name")?;
                output = CpalOutputDevice::with_device(name);
            }
            other => bail!("unknown option {:?}\n{}", other, USAGE),
        }
    }

    let config = env_config::from_env();
    if config.api_key.is_none() {
        log::warn!("No API key set (LIVE_VOICE_API_KEY, GEMINI_API_KEY or API_KEY)");
    }
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid session configuration")?;

    let mut session = LiveSession::new(input, output, WebSocketConnector::new(), config);
    session.set_delegate(Arc::new(ConsoleDelegate));
    session.start();
    eprintln!("Talk to the assistant. Press Enter to hang up.");

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read stdin")?;

    let state = session.state();
    session.stop();

    let diagnostics = session.diagnostics();
    log::info!(
        "Session {:?}: {} frames sent, {} chunks received, {} interruptions",
        session.session_id(),
        diagnostics.frames_captured,
        diagnostics.chunks_received,
        diagnostics.interruptions
    );

    if let SessionState::Errored(error) = state {
        bail!("session failed: {}", error);
    }
    Ok(())
}
