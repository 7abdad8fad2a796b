// src/trainer.rs
//
// Root controller.
//
// The Trainer owns every piece of session state: the exercise library and
// selection, the audio context and its voices, the timer queue, the test
// session and the user's settings. It is single-threaded and never
// blocks; the embedding forwards user actions to it and calls `tick()`
// from its event loop so deferred work (highlights, the next target note,
// unlocking input, clearing key feedback) runs on time.

use log::{debug, info, warn};

use crate::audio_context::AudioContext;
use crate::exercise::{Exercise, ExerciseLibrary, ExerciseNote};
use crate::frontend::{KeyFeedback, MidiStatus, NullSink, StaffRenderer, Status, StatusSink};
use crate::input::{InputEvent, NoteInput, Touch};
use crate::note::NoteSymbol;
use crate::quiz::{TestPhase, TestSession, Verdict};
use crate::samples::SampleTable;
use crate::scheduler::{NoteScheduler, Playback, ScheduledEvent, Task};
use crate::settings::{AudioSettings, SettingsStore};
use crate::staff::{StaffLayout, StaffPosition};
use crate::timer::{CancelToken, TimerQueue, WallClock};
use crate::transport::{Pause, Tempo};
use crate::voice::{Instrument, Voice, VoiceSource};
use crate::voice_registry::VoiceRegistry;

/// Wait after a target note ends before answers are accepted, in ms.
pub const UNLOCK_MARGIN_MS: f64 = 120.0;

/// Ear-training session.
///
/// Responsibilities:
/// - select exercises and keep the staff drawn
/// - play the selected exercise and stop it
/// - run the listen-then-answer test
/// - turn input into sound, verdicts and feedback
/// - keep audio settings applied and persisted
///
/// Does NOT:
/// - render audio (the render side of the bridge does)
/// - discover MIDI devices (the embedding reports their status)
pub struct Trainer {
    library: ExerciseLibrary,
    selected: Option<u32>,
    positions: Vec<Option<StaffPosition>>,

    audio: AudioContext,
    samples: SampleTable,
    registry: VoiceRegistry,
    scheduler: NoteScheduler,
    timers: TimerQueue<Task>,

    session: TestSession,

    /// Guards the pause → play → unlock chain of the running test.
    test_token: CancelToken,

    /// Guards transient key markings. Never cancelled.
    feedback_token: CancelToken,

    instrument: Instrument,
    tempo: Tempo,
    pause: Pause,
    settings: AudioSettings,
    store: Box<dyn SettingsStore>,

    clock: Box<dyn WallClock>,
    renderer: Box<dyn StaffRenderer>,
    sink: Box<dyn StatusSink>,
}

impl Trainer {
    /// A trainer over `library`. Settings are read from `store` right away;
    /// nothing is shown or played until [`init`](Self::init).
    pub fn new(
        library: ExerciseLibrary,
        audio: AudioContext,
        clock: impl WallClock + 'static,
        store: impl SettingsStore + 'static,
    ) -> Self {
        let settings = store.load();
        debug!("Audio settings: {settings:?}");

        Self {
            library,
            selected: None,
            positions: Vec::new(),
            audio,
            samples: SampleTable::new(),
            registry: VoiceRegistry::new(),
            scheduler: NoteScheduler::new(),
            timers: TimerQueue::new(),
            session: TestSession::new(),
            test_token: CancelToken::new(),
            feedback_token: CancelToken::new(),
            instrument: Instrument::default(),
            tempo: Tempo::default(),
            pause: Pause::default(),
            settings,
            store: Box::new(store),
            clock: Box::new(clock),
            renderer: Box::new(StaffLayout::default()),
            sink: Box::new(NullSink),
        }
    }

    pub fn with_renderer(mut self, renderer: impl StaffRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_status(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Share a sample table, typically one a loader thread is filling.
    pub fn with_samples(mut self, samples: SampleTable) -> Self {
        self.samples = samples;
        self
    }

    /// Select the first exercise and apply the stored volume.
    pub fn init(&mut self) {
        match self.selected.or_else(|| self.library.first().map(|e| e.id)) {
            Some(id) => {
                self.select_exercise(id);
            }
            None => self.sink.status(Status::NoExercise),
        }
        self.apply_volume();
        info!(
            "Trainer ready: {} exercises, instrument {}",
            self.library.len(),
            self.instrument
        );
    }

    /// Stop any test and any playback. Selection and settings stay.
    pub fn reset(&mut self) {
        self.stop_test();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Exercises and playback
    // ═══════════════════════════════════════════════════════════════════

    /// Make exercise `id` the active one; unknown ids select the first
    /// exercise. Cancels playback and any test. Returns the selected id.
    pub fn select_exercise(&mut self, id: u32) -> Option<u32> {
        if self.session.phase() != TestPhase::Idle {
            self.stop_test();
        } else {
            self.stop_play();
        }

        let Some(exercise) = self.library.get(id).or_else(|| self.library.first()) else {
            self.selected = None;
            self.sink.status(Status::NoExercise);
            return None;
        };
        if exercise.id != id {
            debug!("No exercise {id}; selecting {}", exercise.id);
        }

        self.selected = Some(exercise.id);
        self.sink.exercise_selected(exercise);
        self.redraw();
        self.selected
    }

    pub fn current_exercise(&self) -> Option<&Exercise> {
        self.selected.and_then(|id| self.library.get(id))
    }

    #[inline]
    pub fn library(&self) -> &ExerciseLibrary {
        &self.library
    }

    /// Play the selected exercise from the start, replacing anything
    /// already playing. `None` when no exercise is selected.
    pub fn play(&mut self) -> Option<Vec<ScheduledEvent>> {
        let Some(notes) = self.current_exercise().map(|e| e.notes.clone()) else {
            self.sink.status(Status::NoExercise);
            return None;
        };
        self.stop_play();

        let playback = Playback {
            audio: &mut self.audio,
            registry: &mut self.registry,
            timers: &mut self.timers,
            instrument: self.instrument,
            samples: &self.samples,
            wall_now: self.clock.now_ms(),
        };
        Some(self.scheduler.schedule_sequence(playback, &notes, self.tempo))
    }

    /// Silence everything and cancel pending highlights. Safe to call with
    /// nothing playing.
    pub fn stop_play(&mut self) {
        self.scheduler
            .stop(&mut self.audio, &mut self.registry, &mut self.timers);
        self.redraw();
    }

    /// Whether a played sequence has not finished yet.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    fn redraw(&mut self) {
        let notes: &[ExerciseNote] = self
            .selected
            .and_then(|id| self.library.get(id))
            .map(|e| e.notes.as_slice())
            .unwrap_or_default();
        self.positions = self.renderer.redraw(notes);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Test
    // ═══════════════════════════════════════════════════════════════════

    /// Start a test over the selected exercise. Returns false (and reports
    /// it) when there is nothing to test.
    pub fn start_test(&mut self) -> bool {
        self.cancel_test_timers();

        let exercise = self.selected.and_then(|id| self.library.get(id));
        if !self.session.start(exercise) {
            self.session.stop();
            self.sink.status(Status::NoExercise);
            return false;
        }

        self.sink.status(Status::TestStarted);
        self.report_score();
        self.arm_target();
        true
    }

    /// Abandon the test and silence its audio.
    pub fn stop_test(&mut self) {
        self.cancel_test_timers();
        self.session.stop();
        self.stop_play();
        self.sink.status(Status::TestStopped);
        self.report_score();
    }

    #[inline]
    pub fn session(&self) -> &TestSession {
        &self.session
    }

    /// Queue the current target after the configured pause.
    fn arm_target(&mut self) {
        let (index, duration) = match self.session.begin_waiting() {
            Some((index, note)) => (index, self.tempo.seconds(note.duration)),
            None => return,
        };

        let due = self.clock.now_ms() + self.pause.millis();
        self.timers
            .schedule(due, &self.test_token, Task::PlayTarget { index, duration });
        debug!(
            "Target {index} in {:.0} ms for {duration:.3}s",
            self.pause.millis()
        );
    }

    fn play_target(&mut self, index: usize, duration: f64) {
        let Some(note) = self.session.begin_sounding(index).map(|n| n.note) else {
            debug!("Dropped stale target {index}");
            return;
        };

        let wall_now = self.clock.now_ms();
        let playback = Playback {
            audio: &mut self.audio,
            registry: &mut self.registry,
            timers: &mut self.timers,
            instrument: self.instrument,
            samples: &self.samples,
            wall_now,
        };
        let played = self.scheduler.play_target(playback, &note, index, duration);

        let unlock_at = wall_now + (played * 1000.0).round() + UNLOCK_MARGIN_MS;
        self.timers
            .schedule(unlock_at, &self.test_token, Task::UnlockInput);
    }

    fn cancel_test_timers(&mut self) {
        self.test_token.cancel();
        self.timers.purge_cancelled();
        self.test_token = CancelToken::new();
    }

    fn report_score(&mut self) {
        self.sink
            .score(self.session.score(), self.session.attempts());
    }

    // ═══════════════════════════════════════════════════════════════════
    // Input
    // ═══════════════════════════════════════════════════════════════════

    /// Feed raw input. Returns the verdict for note attempts.
    pub fn handle_input(&mut self, input: &NoteInput) -> Option<Verdict> {
        match input.normalize()? {
            InputEvent::Attempt { note, touch } => {
                match touch {
                    Touch::Click => self.flash_key(&note, KeyFeedback::Active),
                    Touch::Midi { .. } => self.sink.key_marked(&note, KeyFeedback::Active),
                }
                Some(self.attempt(note, touch))
            }
            InputEvent::Release { note } => {
                self.release(&note);
                None
            }
        }
    }

    /// Attempt `note`.
    ///
    /// While a test holds input locked nothing happens, not even sound.
    /// Otherwise the note sounds and, during a test, is judged.
    pub fn attempt(&mut self, note: NoteSymbol, touch: Touch) -> Verdict {
        if self.session.is_locked() {
            debug!("Ignored {note}: input locked");
            return Verdict::Ignored;
        }

        self.sound(note, touch);

        let verdict = self.session.attempt(&note);
        match verdict {
            Verdict::FreePlay | Verdict::Ignored => return verdict,
            Verdict::Wrong => {
                self.flash_key(&note, KeyFeedback::Wrong);
                self.sink.status(Status::Wrong);
            }
            Verdict::Correct { .. } => {
                self.flash_key(&note, KeyFeedback::Correct);
                self.sink.status(Status::Correct);
                self.arm_target();
            }
            Verdict::Finished => {
                self.flash_key(&note, KeyFeedback::Correct);
                self.sink.status(Status::Finished);
                self.cancel_test_timers();
            }
        }
        self.report_score();
        verdict
    }

    /// Note-off for a held note. Untracked notes only lose their marking.
    pub fn release(&mut self, note: &NoteSymbol) {
        self.sink.key_unmarked(note, KeyFeedback::Active);

        let Some(mut voice) = self.registry.take_held(note) else {
            return;
        };
        match voice.release(&mut self.audio, self.settings.midi_release_seconds) {
            Ok(()) => self.registry.register(voice),
            Err(err) => debug!("Release of {note} failed: {err}"),
        }
    }

    fn sound(&mut self, note: NoteSymbol, touch: Touch) {
        let source = VoiceSource::select(self.instrument, &self.samples, &note);
        match touch {
            Touch::Click => match Voice::click(&mut self.audio, source) {
                Ok(voice) => self.registry.register(voice),
                Err(err) => debug!("{note} is silent: {err}"),
            },
            Touch::Midi { velocity } => {
                if self.registry.stop_held(&mut self.audio, &note) {
                    debug!("Retriggered {note}");
                }
                let gain = self.settings.velocity_curve().gain(velocity);
                let attack = self.settings.midi_attack_seconds;
                match Voice::held(&mut self.audio, source, gain, attack) {
                    Ok(voice) => self.registry.hold(&mut self.audio, note, voice),
                    Err(err) => debug!("{note} is silent: {err}"),
                }
            }
        }
    }

    fn flash_key(&mut self, note: &NoteSymbol, feedback: KeyFeedback) {
        self.sink.key_marked(note, feedback);
        let due = self.clock.now_ms() + feedback.millis();
        self.timers.schedule(
            due,
            &self.feedback_token,
            Task::KeyFeedbackEnd {
                note: *note,
                feedback,
            },
        );
    }

    /// Pass on MIDI availability found by the embedding.
    pub fn set_midi_status(&mut self, status: MidiStatus) {
        info!("{status}");
        self.sink.midi_status(status);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════

    /// Run every task that is due and forget finished voices. Returns how
    /// many tasks ran.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut ran = 0;
        while let Some(task) = self.timers.pop_due(now) {
            self.run(task);
            ran += 1;
        }

        if !self.registry.is_empty() {
            let audio_now = self.audio.now();
            self.registry.prune(audio_now);
        }
        ran
    }

    /// Wall-clock deadline of the next pending task.
    #[inline]
    pub fn next_due(&self) -> Option<f64> {
        self.timers.next_due()
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::Highlight { position } => {
                self.redraw();
                if let Some(at) = self.positions.get(position).copied().flatten() {
                    self.renderer.highlight(position, at);
                }
            }
            Task::ClearHighlight => self.redraw(),
            Task::SequenceComplete => {
                self.scheduler.complete();
                debug!("Sequence complete");
            }
            Task::PlayTarget { index, duration } => self.play_target(index, duration),
            Task::UnlockInput => {
                if self.session.unlock() {
                    debug!("Input unlocked");
                }
            }
            Task::KeyFeedbackEnd { note, feedback } => self.sink.key_unmarked(&note, feedback),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Settings
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    pub fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Sanitize, persist and apply `settings`.
    pub fn update_settings(&mut self, settings: AudioSettings) {
        let settings = settings.sanitized();
        let volume_changed = settings.volume != self.settings.volume;
        self.settings = settings;
        self.persist();
        if volume_changed {
            self.apply_volume();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.update_settings(AudioSettings {
            volume,
            ..self.settings
        });
    }

    /// Back to default settings, persisted and applied.
    pub fn reset_settings(&mut self) {
        self.settings = AudioSettings::default();
        self.persist();
        self.apply_volume();
    }

    fn persist(&mut self) {
        if let Err(err) = self.store.save(&self.settings) {
            warn!("Could not save audio settings: {err}");
        }
    }

    fn apply_volume(&mut self) {
        if let Err(err) = self.audio.set_volume(self.settings.volume) {
            debug!("Volume kept for later: {err}");
        }
    }

    #[inline]
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    #[inline]
    pub fn pause(&self) -> Pause {
        self.pause
    }

    pub fn set_pause(&mut self, pause: Pause) {
        self.pause = pause;
    }

    #[inline]
    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn set_instrument(&mut self, instrument: Instrument) {
        debug!("Instrument: {instrument}");
        self.instrument = instrument;
    }

    /// The sample table voices are chosen from.
    #[inline]
    pub fn samples(&self) -> &SampleTable {
        &self.samples
    }

    /// Voices currently tracked, held ones included.
    #[inline]
    pub fn active_voices(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn held_voices(&self) -> usize {
        self.registry.held_count()
    }

    #[inline]
    pub fn audio(&self) -> &AudioContext {
        &self.audio
    }
}
