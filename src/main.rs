//! pianoboard - record and replay a virtual piano on an in-memory canvas.
//!
//! The demo scripts a short performance onto a fresh board (or replays a
//! board saved by a previous run), then plays it back, logging every note
//! trigger. Timing is simulated by default so the demo finishes instantly;
//! `--realtime` paces playback against the wall clock instead.
//!
//! # Usage
//!
//! ```bash
//! cargo run                        # record the demo riff and replay it
//! cargo run -- --save board.json  # also persist the board
//! cargo run -- --load board.json  # replay a previously saved board
//! cargo run -- --realtime         # pace playback in real time
//! ```

mod board;
mod clock;
mod note;
mod surface;

use anyhow::{Context, Result};
use board::{Keyboard, DISPATCH_TICK_MS};
use note::NoteName;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use surface::MemorySurface;

/// Command-line options for the demo.
struct CliOptions {
    /// Save the recorded board to this path.
    save: Option<PathBuf>,
    /// Load a board from this path instead of recording.
    load: Option<PathBuf>,
    /// Pace playback against the wall clock.
    realtime: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--save <path>`: write the board as JSON after recording
    /// - `--load <path>`: replay a board written by `--save`
    /// - `--realtime` or `-r`: sleep between playback ticks
    /// - `--help` or `-h`: print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut save = None;
        let mut load = None;
        let mut realtime = false;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--save" => {
                    i += 1;
                    let path = args
                        .get(i)
                        .context("--save requires a path argument")?;
                    save = Some(PathBuf::from(path));
                }
                "--load" => {
                    i += 1;
                    let path = args
                        .get(i)
                        .context("--load requires a path argument")?;
                    load = Some(PathBuf::from(path));
                }
                "--realtime" | "-r" => realtime = true,
                "--help" | "-h" => {
                    println!("pianoboard - record and replay a virtual piano on a canvas");
                    println!();
                    println!("Usage: pianoboard [--save <path>] [--load <path>] [--realtime]");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(Self {
            save,
            load,
            realtime,
        })
    }
}

/// The demo riff: (note, press ms, release ms) since the recording started.
const DEMO_RIFF: [(NoteName, u64, u64); 5] = [
    (NoteName::C, 0, 500),
    (NoteName::E, 200, 700),
    (NoteName::G, 400, 900),
    (NoteName::B, 1000, 1450),
    (NoteName::C, 1500, 2200),
];

/// Records the demo riff onto a fresh keyboard, pumping the session clock so
/// the head marker and note growth run just as they would live.
fn record_demo(surface: &mut MemorySurface, keyboard: &mut Keyboard) -> Result<()> {
    keyboard.start_recording(surface, 0)?;

    // Replay the riff as a sorted event list against the simulated clock.
    let mut events: Vec<(u64, NoteName, bool)> = Vec::new();
    for (note, press, release) in DEMO_RIFF {
        events.push((press, note, true));
        events.push((release, note, false));
    }
    events.sort_by_key(|&(at, _, _)| at);

    for (at, note, is_press) in events {
        keyboard.advance(surface, at)?;
        if is_press {
            keyboard.start_note(surface, note, at)?;
        } else {
            keyboard.stop_note(surface, note, at)?;
        }
    }
    keyboard.stop_recording(surface)?;
    tracing::info!(notes = DEMO_RIFF.len(), "recorded demo riff");
    Ok(())
}

/// Plays the board back, logging each trigger, until the session completes.
fn replay(surface: &mut MemorySurface, keyboard: &mut Keyboard, realtime: bool) -> Result<()> {
    let timeline = keyboard.decode_timeline(surface)?;
    println!(
        "Replaying {} notes across {} start offsets:",
        timeline.note_count(),
        timeline.bucket_count()
    );
    if !timeline.skipped().is_empty() {
        println!("  ({} malformed blocks skipped)", timeline.skipped().len());
    }

    let done = Rc::new(Cell::new(false));
    let done_flag = Rc::clone(&done);
    keyboard.play(
        surface,
        0,
        |note, duration_ms| {
            println!("  play {:<2} for {} ms", note.label(), duration_ms);
        },
        move || done_flag.set(true),
    )?;

    let started = Instant::now();
    let mut now_ms = 0u64;
    while keyboard.is_playing() {
        now_ms += DISPATCH_TICK_MS;
        if realtime {
            let target = Duration::from_millis(now_ms);
            if let Some(wait) = target.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        keyboard.advance(surface, now_ms)?;
    }
    // Highlight overlays of the final notes may still be pending; clear them
    // so they don't linger on a board saved after the replay.
    keyboard.stop_playing(surface)?;
    debug_assert!(done.get());
    println!("Done.");
    Ok(())
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    // Initialize logging (optional, for debugging)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (mut surface, mut keyboard) = if let Some(path) = &cli.load {
        let surface = MemorySurface::load_from_file(path)
            .with_context(|| format!("failed to load board: {}", path.display()))?;
        // The saved board holds exactly one keyboard frame; rediscover it.
        let frame = surface
            .frames()
            .into_iter()
            .next()
            .context("no keyboard frame in the saved board")?;
        let keyboard = Keyboard::open(&surface, frame)?;
        println!("Loaded board from {}", path.display());
        (surface, keyboard)
    } else {
        let mut surface = MemorySurface::new();
        let mut keyboard = Keyboard::create(&mut surface)?;
        record_demo(&mut surface, &mut keyboard)?;
        (surface, keyboard)
    };

    replay(&mut surface, &mut keyboard, cli.realtime)?;

    if let Some(path) = &cli.save {
        surface
            .save_to_file(path)
            .with_context(|| format!("failed to save board: {}", path.display()))?;
        println!("Saved board to {}", path.display());
    }

    Ok(())
}
