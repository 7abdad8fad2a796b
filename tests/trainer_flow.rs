// tests/trainer_flow.rs
//
// End to end: exercise document → trainer → loopback device → rendered
// audio, driven by a manual clock the way a page or CLI drives it.

use notequiz::frontend::{FrontendEvent, Recorder};
use notequiz::{
    AudioContext, AudioSettings, ExerciseLibrary, JsonFileStore, LoopbackFactory, ManualClock,
    MemoryStore, NoteInput, NoteSymbol, Pause, RenderSlot, SettingsStore, Status, Tempo, TestPhase,
    Trainer, Verdict,
};
use pretty_assertions::assert_eq;

const RATE: f64 = 8_000.0;
const BLOCK: usize = 80; // 10 ms at RATE

const DOCUMENT: &str = r#"{
    "samples": [
        { "id": 7, "title": "Up a third", "exercise": "Two notes",
          "notes": [ { "note": "C4", "duration": "quarter" },
                     { "note": "E4", "duration": "quarter" } ] }
    ]
}"#;

struct Harness {
    trainer: Trainer,
    clock: ManualClock,
    slot: RenderSlot,
    recorder: Recorder,
}

impl Harness {
    fn new(store: impl SettingsStore + 'static) -> Self {
        let library = ExerciseLibrary::from_json(DOCUMENT).unwrap();
        let slot = RenderSlot::new();
        let clock = ManualClock::new();
        let recorder = Recorder::new();
        let audio = AudioContext::new(LoopbackFactory::new(RATE, slot.clone()));
        let mut trainer = Trainer::new(library, audio, clock.clone(), store)
            .with_renderer(recorder.clone())
            .with_status(recorder.clone());
        trainer.init();
        Self {
            trainer,
            clock,
            slot,
            recorder,
        }
    }

    /// Render 10 ms of mono audio, then let wall time catch up.
    fn step(&mut self) -> f32 {
        let mut block = [0.0f32; BLOCK];
        self.slot.render(&mut block, 1);
        self.clock.advance(10.0);
        self.trainer.tick();
        block.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    fn run_for(&mut self, millis: u32) -> f32 {
        (0..millis / 10).map(|_| self.step()).fold(0.0, f32::max)
    }
}

fn note(s: &str) -> NoteSymbol {
    s.parse().unwrap()
}

#[test]
fn test_playback_renders_audio_and_highlights_each_note() {
    let mut h = Harness::new(MemoryStore::new());
    h.trainer.set_tempo(Tempo::new(120));
    assert_eq!(h.trainer.play().map(|events| events.len()), Some(2));

    let mut peak = 0.0f32;
    let mut blocks = 0;
    while h.trainer.is_playing() && blocks < 500 {
        peak = peak.max(h.step());
        blocks += 1;
    }

    assert!(!h.trainer.is_playing());
    assert!(peak > 0.01, "peak {peak}");
    assert_eq!(h.recorder.highlights(), vec![0, 1]);

    // Release tails finish and the renderer goes quiet.
    assert!(h.run_for(1_000) < 1e-3);
    assert_eq!(h.trainer.active_voices(), 0);
}

#[test]
fn test_full_quiz_round() {
    let mut h = Harness::new(MemoryStore::new());
    h.trainer.set_pause(Pause::new(0.5));
    assert!(h.trainer.start_test());
    assert!(h.trainer.session().is_locked());

    // Nothing sounds during the pause.
    assert!(h.run_for(400) < 1e-3);
    assert_eq!(h.trainer.session().phase(), TestPhase::Waiting);

    // Target sounds, then input unlocks.
    let peak = h.run_for(1_500);
    assert!(peak > 0.01);
    assert_eq!(h.trainer.session().phase(), TestPhase::Listening);

    let pointer = |name: &str| NoteInput::Pointer { note: note(name) };
    assert_eq!(h.trainer.handle_input(&pointer("G4")), Some(Verdict::Wrong));
    assert_eq!(
        h.trainer.handle_input(&pointer("C4")),
        Some(Verdict::Correct { next: 1 })
    );
    assert!(h.trainer.session().is_locked());

    h.run_for(2_000);
    assert_eq!(
        h.trainer.handle_input(&pointer("E4")),
        Some(Verdict::Finished)
    );
    assert_eq!(h.recorder.last_status(), Some(Status::Finished));
    assert_eq!(
        (h.trainer.session().score(), h.trainer.session().attempts()),
        (2, 3)
    );

    let events = h.recorder.events();
    assert!(events.contains(&FrontendEvent::Score {
        score: 2,
        attempts: 3
    }));
    assert!(!events.contains(&FrontendEvent::Status(Status::TestStopped)));
}

#[test]
fn test_selecting_exercise_ends_running_test() {
    let mut h = Harness::new(MemoryStore::new());
    h.trainer.set_pause(Pause::new(0.0));
    h.trainer.start_test();
    h.run_for(50);

    h.trainer.select_exercise(7);
    assert_eq!(h.trainer.session().phase(), TestPhase::Idle);
    assert_eq!(h.recorder.last_status(), Some(Status::TestStopped));
    assert!(h.run_for(1_000) < 1e-3);
}

#[test]
fn test_settings_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio-settings.json");

    let mut first = Harness::new(JsonFileStore::new(&path));
    first.trainer.update_settings(AudioSettings {
        volume: 0.25,
        midi_curve: 2.0,
        ..AudioSettings::default()
    });

    let second = Harness::new(JsonFileStore::new(&path));
    assert_eq!(second.trainer.settings().volume, 0.25);
    assert_eq!(second.trainer.settings().midi_curve, 2.0);
    assert_eq!(second.trainer.audio().volume(), 0.25);
}
