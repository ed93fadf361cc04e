// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser};
use polysampler::config::SamplerConfig;
use polysampler::samples::{SampleLibrary, VoiceManager, DEFAULT_MAX_VOICES};
use polysampler::{audio, dispatch, midi};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Raw MIDI events buffered between the input port and the dispatcher.
const EVENT_BUFFER: usize = 256;

/// How long to wait for voice workers to finish their last block at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic MIDI-triggered sample player."
)]
struct Cli {
    /// The directory of audio clips. Clips are assigned notes in filename order.
    #[arg(required_unless_present_any = ["devices", "midi_devices"])]
    sample_dir: Option<PathBuf>,

    /// Path to a YAML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The exact name of the MIDI input to watch.
    #[arg(short, long)]
    midi_device: Option<String>,

    /// The audio output device. Defaults to the host's default output.
    #[arg(short, long)]
    audio_device: Option<String>,

    /// The note assigned to the first clip.
    #[arg(short, long)]
    base_note: Option<u8>,

    /// Lists the available audio output devices and exits.
    #[arg(long)]
    devices: bool,

    /// Lists the available MIDI inputs and exits.
    #[arg(long)]
    midi_devices: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.devices {
        print_devices(audio::list_devices()?);
        return Ok(());
    }
    if cli.midi_devices {
        print_devices(midi::list_devices()?);
        return Ok(());
    }

    let sample_dir = cli.sample_dir.ok_or("a sample directory is required")?;
    let config = SamplerConfig::load(cli.config.as_deref())?.with_overrides(
        cli.midi_device,
        cli.audio_device,
        cli.base_note,
    )?;

    let mapping = SampleLibrary::load(&sample_dir, config.base_note())?;

    let sink = audio::get_sink(config.audio_device())?;
    // Open each format once now so that an unusable device fails at startup
    // rather than inside a voice.
    let formats: BTreeSet<(u32, u16)> = mapping
        .iter()
        .map(|(_, clip)| (clip.sample_rate(), clip.channel_count()))
        .collect();
    for (sample_rate, channels) in formats {
        drop(sink.open(sample_rate, channels)?);
    }

    let source = midi::get_source(config.midi_device())?;
    let manager = VoiceManager::new(mapping, sink.clone(), DEFAULT_MAX_VOICES);

    let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
    source.watch_events(sender)?;
    info!(source = %source, sink = %sink, "Ready");

    let dispatcher = tokio::spawn(dispatch::run(manager.clone(), receiver));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // Closing the source closes the channel; the dispatcher then stops every voice.
    source.stop_watch_events();
    dispatcher.await?;

    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while manager.workers() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if manager.workers() > 0 {
        warn!(workers = manager.workers(), "Voice workers still running at exit");
    }
    info!(stats = ?manager.stats(), "Stopped");

    Ok(())
}

fn print_devices(devices: Vec<String>) {
    if devices.is_empty() {
        println!("No devices found.");
        return;
    }

    println!("Devices:");
    for device in devices {
        println!("- {}", device);
    }
}
