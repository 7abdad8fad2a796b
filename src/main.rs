// src/main.rs
//
// Command-line front end: list exercises, render one to a WAV file, or run
// the listen-then-answer quiz from the terminal.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info, warn};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use notequiz::audio_context::{AudioContext, LoopbackFactory, RenderSlot};
use notequiz::exercise::{Exercise, ExerciseLibrary};
use notequiz::frontend::{MidiStatus, Status, StatusSink};
use notequiz::input::{NoteInput, keyboard_notes};
use notequiz::note::NoteSymbol;
use notequiz::samples::{SampleTable, load_directory};
use notequiz::settings::{JsonFileStore, MemoryStore};
use notequiz::timer::{ManualClock, SystemClock, WallClock};
use notequiz::trainer::Trainer;
use notequiz::transport::{Pause, Tempo};
use notequiz::voice::Instrument;

/// Frames rendered per block by the offline renderer.
const RENDER_BLOCK: usize = 256;

/// Longest the quiz loop sleeps between timer checks.
const MAX_IDLE: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::List(args) => list(args),
        Commands::Render(args) => render(args),
        Commands::Quiz(args) => quiz(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        ConfigBuilder::default().build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap_or_else(|err| eprintln!("Logging unavailable: {err}"));
}

// ═══════════════════════════════════════════════════════════════════
// Arguments
// ═══════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(author, version, about = "Ear training: hear a melody, then name it note by note")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the exercises of a library.
    List(LibraryArgs),
    /// Render an exercise to a WAV file.
    Render(RenderArgs),
    /// Take the listen-then-answer test in the terminal.
    Quiz(QuizArgs),
}

#[derive(Args)]
struct LibraryArgs {
    /// Exercise library (JSON).
    #[arg(long, default_value = "data/exercises.json")]
    exercises: PathBuf,
}

#[derive(Args)]
struct SoundArgs {
    /// Tempo in beats per minute (clamped to 40..=220).
    #[arg(long, default_value_t = Tempo::DEFAULT_BPM)]
    tempo: u32,

    /// piano, sine, square, sawtooth or triangle.
    #[arg(long, default_value = "piano", value_parser = parse_instrument)]
    instrument: Instrument,

    /// Directory of note samples named C4.wav, C#4.wav, ...
    #[arg(long)]
    samples: Option<PathBuf>,
}

#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    library: LibraryArgs,

    #[command(flatten)]
    sound: SoundArgs,

    /// Exercise to render; defaults to the first one.
    #[arg(long)]
    id: Option<u32>,

    /// Output WAV file.
    #[arg(long, short)]
    out: PathBuf,

    /// Output sample rate in Hz.
    #[arg(long, default_value_t = 44_100)]
    rate: u32,
}

#[derive(Args)]
struct QuizArgs {
    #[command(flatten)]
    library: LibraryArgs,

    #[command(flatten)]
    sound: SoundArgs,

    /// Exercise to start with; defaults to the first one.
    #[arg(long)]
    id: Option<u32>,

    /// Silence before each target note, in seconds.
    #[arg(long, default_value_t = Pause::DEFAULT_SECONDS)]
    pause: f64,

    /// Audio settings file; defaults to the platform config directory.
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn parse_instrument(text: &str) -> Result<Instrument, String> {
    text.parse()
        .map_err(|()| format!("unknown instrument '{text}'"))
}

fn load_library(path: &Path) -> Result<ExerciseLibrary> {
    ExerciseLibrary::load(path)
        .with_context(|| format!("failed to load exercises from {}", path.display()))
}

// ═══════════════════════════════════════════════════════════════════
// list
// ═══════════════════════════════════════════════════════════════════

fn list(args: LibraryArgs) -> Result<()> {
    let library = load_library(&args.exercises)?;
    for exercise in library.iter() {
        println!(
            "{:>4}  {:<32} {} notes",
            exercise.id,
            exercise.title,
            exercise.notes.len()
        );
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════
// render
// ═══════════════════════════════════════════════════════════════════

fn render(args: RenderArgs) -> Result<()> {
    let library = load_library(&args.library.exercises)?;
    if args.rate == 0 {
        bail!("sample rate must be positive");
    }

    let samples = SampleTable::new();
    if let Some(dir) = &args.sound.samples {
        load_directory(&samples, dir, keyboard_notes());
    }

    let slot = RenderSlot::new();
    let clock = ManualClock::new();
    let audio = AudioContext::new(LoopbackFactory::new(args.rate as f64, slot.clone()));
    let mut trainer = Trainer::new(library, audio, clock.clone(), MemoryStore::new())
        .with_samples(samples);
    trainer.set_tempo(Tempo::new(args.sound.tempo));
    trainer.set_instrument(args.sound.instrument);
    trainer.init();
    if let Some(id) = args.id {
        trainer.select_exercise(id);
    }

    let events = trainer
        .play()
        .ok_or_else(|| anyhow!("the library has no exercises"))?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: args.rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.out, spec)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let block_ms = RENDER_BLOCK as f64 * 1000.0 / args.rate as f64;
    let mut block = vec![0.0f32; RENDER_BLOCK];
    let mut frames = 0usize;
    while trainer.is_playing() {
        slot.render(&mut block, 1);
        for sample in &block {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        frames += RENDER_BLOCK;
        clock.advance(block_ms);
        trainer.tick();
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finish {}", args.out.display()))?;

    info!("Rendered {} notes", events.len());
    println!(
        "Wrote {} ({:.2}s, {} notes)",
        args.out.display(),
        frames as f64 / args.rate as f64,
        events.len()
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════
// quiz
// ═══════════════════════════════════════════════════════════════════

/// Prints what the trainer reports.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn status(&mut self, status: Status) {
        println!("{status}");
    }

    fn score(&mut self, score: u32, attempts: u32) {
        println!("Score: {score}/{attempts}");
    }

    fn midi_status(&mut self, status: MidiStatus) {
        println!("{status}");
    }

    fn exercise_selected(&mut self, exercise: &Exercise) {
        println!("[{}] {}", exercise.id, exercise.title);
        if !exercise.text.is_empty() {
            println!("{}", exercise.text);
        }
    }
}

const QUIZ_HELP: &str = "\
Commands:
  play | stop           play the exercise / stop playback
  start | end           start / stop the test
  select <id>           choose an exercise
  tempo <bpm>           set the tempo
  pause <seconds>       set the pause before each target
  instrument <name>     piano, sine, square, sawtooth, triangle
  volume <0..1>         set the master volume
  defaults              restore default audio settings
  <note>                answer with a note, e.g. C4, F#4, Bb3
  <key>                 answer with a computer key (a = C4, w = C#4, ...)
  help | quit";

fn quiz(args: QuizArgs) -> Result<()> {
    let library = load_library(&args.library.exercises)?;
    let store = match args.settings {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::at_default_location()
            .context("no settings location; pass --settings")?,
    };

    let samples = SampleTable::new();
    if let Some(dir) = args.sound.samples.clone() {
        let loader_table = samples.clone();
        thread::spawn(move || load_directory(&loader_table, dir, keyboard_notes()));
    }

    let slot = RenderSlot::new();
    let (_output, audio) = open_audio(slot);

    let clock = SystemClock::new();
    let mut trainer = Trainer::new(library, audio, clock, store)
        .with_samples(samples)
        .with_status(ConsoleSink);
    trainer.set_tempo(Tempo::new(args.sound.tempo));
    trainer.set_pause(Pause::new(args.pause));
    trainer.set_instrument(args.sound.instrument);
    trainer.init();
    if let Some(id) = args.id {
        trainer.select_exercise(id);
    }
    trainer.set_midi_status(MidiStatus::NotSupported);
    println!("{QUIZ_HELP}");

    let (lines_tx, lines) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(|line| line.ok()) {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        trainer.tick();

        let wait = trainer
            .next_due()
            .map(|due| Duration::from_secs_f64(((due - clock.now_ms()) / 1000.0).max(0.0)))
            .map_or(MAX_IDLE, |d| d.min(MAX_IDLE));

        match lines.recv_timeout(wait) {
            Ok(line) => {
                if !run_command(&mut trainer, line.trim()) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    trainer.reset();
    Ok(())
}

#[cfg(feature = "native")]
fn open_audio(slot: RenderSlot) -> (Option<notequiz::output::LiveOutput>, AudioContext) {
    use notequiz::audio_context::unavailable;
    use notequiz::output::LiveOutput;

    match LiveOutput::open(slot.clone()) {
        Ok(output) => {
            let factory = LoopbackFactory::new(output.sample_rate(), slot);
            (Some(output), AudioContext::new(factory))
        }
        Err(err) => {
            warn!("Playing silently: {err}");
            (None, AudioContext::new(unavailable(&err.to_string())))
        }
    }
}

#[cfg(not(feature = "native"))]
fn open_audio(_slot: RenderSlot) -> (Option<()>, AudioContext) {
    use notequiz::audio_context::unavailable;

    warn!("Built without the `native` feature; playing silently");
    (None, AudioContext::new(unavailable("no sound card support")))
}

/// Apply one line of user input. Returns false to quit.
fn run_command(trainer: &mut Trainer, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return true;
    };
    let argument = words.next();

    match (command.to_ascii_lowercase().as_str(), argument) {
        ("quit" | "exit", _) => return false,
        ("help", _) => println!("{QUIZ_HELP}"),
        ("play", None) => {
            trainer.play();
        }
        ("stop", None) => trainer.stop_play(),
        ("start", None) => {
            trainer.start_test();
        }
        ("end", None) => trainer.stop_test(),
        ("select", Some(id)) => match id.parse() {
            Ok(id) => {
                trainer.select_exercise(id);
            }
            Err(_) => println!("Not an exercise id: {id}"),
        },
        ("tempo", Some(bpm)) => {
            trainer.set_tempo(Tempo::parse(bpm));
            println!("Tempo: {} bpm", trainer.tempo().bpm());
        }
        ("pause", Some(seconds)) => {
            trainer.set_pause(Pause::parse(seconds));
            println!("Pause: {}s", trainer.pause().seconds());
        }
        ("instrument", Some(name)) => match parse_instrument(name) {
            Ok(instrument) => trainer.set_instrument(instrument),
            Err(err) => println!("{err}"),
        },
        ("volume", Some(volume)) => match volume.parse::<f32>() {
            Ok(volume) => {
                trainer.set_volume(volume);
                println!("Volume: {:.2}", trainer.settings().volume);
            }
            Err(_) => println!("Not a volume: {volume}"),
        },
        ("defaults", None) => trainer.reset_settings(),
        _ => answer(trainer, line),
    }
    true
}

fn answer(trainer: &mut Trainer, text: &str) {
    let input = if let Ok(note) = text.parse::<NoteSymbol>() {
        NoteInput::Pointer { note }
    } else {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => NoteInput::Key { key, repeat: false },
            _ => {
                println!("Unknown command or note: {text} (try 'help')");
                return;
            }
        }
    };

    if trainer.handle_input(&input).is_none() {
        println!("No key for '{text}'");
    }
}
