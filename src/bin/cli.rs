//! akmix CLI: inspect a binary song, print it to WAV, or play it live.
//!
//! Usage:
//!   ak-cli info song.aks
//!   ak-cli print song.aks out.wav --pcm 1=kick.wav
//!   ak-cli play song.aks --seconds 30

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ak_audio::{AudioOutput, CpalOutput};
use ak_master::{
    render_song_to_wav, ChannelLayout, Controller, ControllerConfig, LockedSong, MemoryStore,
    MixerConfig, ResourceId,
};
use clap::{crate_version, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version = crate_version!(), about = "akmix song player")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a song's tempo, tables and length.
    Info {
        /// Binary song file.
        song: PathBuf,
    },
    /// Print a song to a mono WAV file.
    Print {
        /// Binary song file.
        song: PathBuf,
        /// Output WAV file.
        output: PathBuf,
        /// Output sample rate.
        #[arg(short, long, default_value_t = 44100)]
        rate: u32,
        #[command(flatten)]
        resources: Resources,
    },
    /// Play a song on the default output device until interrupted.
    Play {
        /// Binary song file.
        song: PathBuf,
        /// Stop after this many seconds.
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Interpret the song live instead of printing it first.
        #[arg(short, long)]
        direct: bool,
        #[command(flatten)]
        resources: Resources,
    },
}

#[derive(Args)]
struct Resources {
    /// Drum sample as ID=file.wav. May be repeated.
    #[arg(long = "pcm", value_parser = parse_resource)]
    pcms: Vec<(ResourceId, PathBuf)>,
    /// Instrument envelope as ID=file. May be repeated.
    #[arg(long = "instrument", value_parser = parse_resource)]
    instruments: Vec<(ResourceId, PathBuf)>,
}

const SONG_ID: ResourceId = 0;

fn parse_resource(arg: &str) -> Result<(ResourceId, PathBuf), String> {
    let (id, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got {arg}"))?;
    let id = id
        .parse::<ResourceId>()
        .map_err(|e| format!("bad resource id {id}: {e}"))?;
    Ok((id, PathBuf::from(path)))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info { song } => info(&song),
        Commands::Print {
            song,
            output,
            rate,
            resources,
        } => print(&song, &output, rate, &resources),
        Commands::Play {
            song,
            seconds,
            direct,
            resources,
        } => play(&song, seconds, direct, &resources),
    }
}

/// Build a controller at `mixer`'s rate with every resource loaded and the
/// song stored under [`SONG_ID`].
fn load(path: &Path, mixer: MixerConfig, resources: &Resources) -> Result<(Controller, LockedSong), Box<dyn Error>> {
    let config = ControllerConfig {
        mixer,
        ..ControllerConfig::default()
    };
    let mut ctrl = Controller::new(config, MemoryStore::new());
    for (id, pcm) in &resources.pcms {
        ctrl.load_wav(*id, &fs::read(pcm)?)?;
    }
    for (id, instrument) in &resources.instruments {
        ctrl.load_instrument(*id, &fs::read(instrument)?)?;
    }
    let song = ctrl.load_song(SONG_ID, &fs::read(path)?)?;
    Ok((ctrl, song))
}

fn info(path: &Path) -> Result<(), Box<dyn Error>> {
    let rate = MixerConfig::default().sample_rate;
    let song = ak_formats::decode_song(&fs::read(path)?, rate)?;

    println!("Tempo:       {} BPM", song.tempo());
    println!("Commands:    {}", song.commands().len());
    println!("Beats:       {}", song.count_beats());
    println!("Drums:       {}", song.drums().len());
    println!("Instruments: {}", song.instruments().len());
    let frames = song.duration_frames(rate);
    println!("Length:      {:.2} s", frames as f64 / rate as f64);
    Ok(())
}

fn print(path: &Path, output: &Path, rate: u32, resources: &Resources) -> Result<(), Box<dyn Error>> {
    let mixer = MixerConfig {
        sample_rate: rate,
        layout: ChannelLayout::Mono,
        print_songs: false,
        ..MixerConfig::default()
    };
    let (_ctrl, song) = load(path, mixer, resources)?;

    println!("Printing to {} at {} Hz...", output.display(), rate);
    let start = Instant::now();
    let wav = render_song_to_wav(&song, rate)?;
    fs::write(output, &wav)?;
    println!("Wrote {} bytes in {:.2?}", wav.len(), start.elapsed());
    Ok(())
}

fn play(path: &Path, seconds: Option<u64>, direct: bool, resources: &Resources) -> Result<(), Box<dyn Error>> {
    let device = CpalOutput::new(2)?;
    let mixer = MixerConfig {
        sample_rate: device.sample_rate(),
        layout: ChannelLayout::Stereo,
        print_songs: !direct,
        ..MixerConfig::default()
    };
    let (mut ctrl, _song) = load(path, mixer, resources)?;

    ctrl.watch_sync_tokens(|token| println!("\nsync {token:#06x}"));
    ctrl.set_clip_callback(Some(Box::new(|clip| {
        log::warn!("clipped {} left, {} right", clip.left, clip.right);
    })));

    ctrl.start_output(device)?;
    ctrl.play_song(SONG_ID)?;
    println!("Playing at {} Hz...", mixer.sample_rate);
    println!();

    let limit = seconds.map(Duration::from_secs);
    let start = Instant::now();
    while limit.map_or(true, |l| start.elapsed() < l) {
        ctrl.update()?;
        let status = ctrl.with_mixer(|m| (m.song_beat(), m.song_progress()));
        match status {
            (Some(beat), _) => print!("\rBeat: {beat:4}"),
            (None, Some(progress)) => print!("\rPrinted: {progress:3}%"),
            _ => {}
        }
        std::io::stdout().flush()?;
        std::thread::sleep(Duration::from_millis(10));
    }

    ctrl.stop_song();
    std::thread::sleep(Duration::from_millis(ak_master::SONG_FADE_MS as u64));
    ctrl.stop_output()?;
    println!("\rDone.            ");
    Ok(())
}
