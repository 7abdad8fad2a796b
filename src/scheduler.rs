// src/scheduler.rs

use log::{debug, warn};

use crate::audio_context::AudioContext;
use crate::exercise::ExerciseNote;
use crate::frontend::KeyFeedback;
use crate::note::NoteSymbol;
use crate::samples::SampleTable;
use crate::timer::{CancelToken, TimerId, TimerQueue};
use crate::transport::{ClockOffset, Tempo};
use crate::voice::{Instrument, Voice, VoiceSource};
use crate::voice_registry::VoiceRegistry;

/// Delay between issuing a sequence and its first note, in seconds.
pub const SEQUENCE_LEAD: f64 = 0.1;

/// Slack after the last note before the sequence counts as complete, in ms.
pub const COMPLETION_MARGIN_MS: f64 = 50.0;

/// ===============================
/// Scheduled notes
/// ===============================

/// One note of a queued sequence in audio-clock time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub note: NoteSymbol,

    /// Audio-clock start, in seconds.
    pub start_time: f64,

    /// Length in seconds.
    pub duration: f64,

    /// Index of the note in its exercise, for highlighting.
    pub position: usize,
}

impl ScheduledEvent {
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Lay a note list out back to back, starting [`SEQUENCE_LEAD`] after
/// `audio_now`.
pub fn plan_sequence(notes: &[ExerciseNote], tempo: Tempo, audio_now: f64) -> Vec<ScheduledEvent> {
    let mut cursor = audio_now + SEQUENCE_LEAD;
    notes
        .iter()
        .enumerate()
        .map(|(position, n)| {
            let duration = tempo.seconds(n.duration);
            let event = ScheduledEvent {
                note: n.note,
                start_time: cursor,
                duration,
                position,
            };
            cursor += duration;
            event
        })
        .collect()
}

/// ===============================
/// Deferred work
/// ===============================

/// Work the trainer defers to a wall-clock deadline.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Mark the note at `position` on the staff.
    Highlight { position: usize },

    /// Redraw the staff without highlight.
    ClearHighlight,

    /// The queued sequence has finished sounding.
    SequenceComplete,

    /// Play the test's target note (after the pre-target pause).
    PlayTarget { index: usize, duration: f64 },

    /// The target note has finished; accept answers again.
    UnlockInput,

    /// Remove a transient marking from a key.
    KeyFeedbackEnd {
        note: NoteSymbol,
        feedback: KeyFeedback,
    },
}

/// Everything the scheduler needs to start voices and arm timers.
pub struct Playback<'a> {
    pub audio: &'a mut AudioContext,
    pub registry: &'a mut VoiceRegistry,
    pub timers: &'a mut TimerQueue<Task>,
    pub instrument: Instrument,
    pub samples: &'a SampleTable,

    /// Wall clock at issuance, in ms.
    pub wall_now: f64,
}

impl Playback<'_> {
    /// Create one voice, register it. A device failure leaves the note
    /// silent; its timers are still armed by the caller.
    fn start_voice(&mut self, note: &NoteSymbol, start: f64, duration: f64) {
        let source = VoiceSource::select(self.instrument, self.samples, note);
        match Voice::scheduled(self.audio, source, start, duration) {
            Ok(voice) => self.registry.register(voice),
            Err(err) => warn!("Could not play {note}: {err}"),
        }
    }
}

/// Turns note lists into voices and highlight timers.
///
/// Responsibilities:
/// - compute audio start times from tempo
/// - create and register one voice per note
/// - arm highlight / clear / completion timers correlated with the audio
/// - cancel all of it at once
///
/// Does NOT:
/// - know about tests, scores or input
/// - render audio
#[derive(Debug, Default)]
pub struct NoteScheduler {
    token: CancelToken,
    completion: Option<TimerId>,
}

impl NoteScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token guarding the timers of the current playback.
    #[inline]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Queue a whole note list. Returns the planned events.
    pub fn schedule_sequence(
        &mut self,
        mut playback: Playback<'_>,
        notes: &[ExerciseNote],
        tempo: Tempo,
    ) -> Vec<ScheduledEvent> {
        let audio_now = playback.audio.now();
        let offset = ClockOffset::capture(audio_now, playback.wall_now);
        let events = plan_sequence(notes, tempo, audio_now);

        for event in &events {
            playback.start_voice(&event.note, event.start_time, event.duration);

            let highlight_at = offset.wall_time(event.start_time);
            playback.timers.schedule(
                highlight_at,
                &self.token,
                Task::Highlight {
                    position: event.position,
                },
            );
            playback.timers.schedule(
                highlight_at + event.duration * 1000.0,
                &self.token,
                Task::ClearHighlight,
            );
        }

        let end = events.last().map_or(audio_now + SEQUENCE_LEAD, ScheduledEvent::end_time);
        let complete_at =
            playback.wall_now + ((end - audio_now) * 1000.0).ceil() + COMPLETION_MARGIN_MS;
        if let Some(previous) = self.completion.take() {
            playback.timers.cancel(previous);
        }
        self.completion = Some(playback.timers.schedule(
            complete_at,
            &self.token,
            Task::SequenceComplete,
        ));

        debug!(
            "Scheduled {} notes at {} bpm, {:.3}s..{:.3}s",
            events.len(),
            tempo.bpm(),
            audio_now + SEQUENCE_LEAD,
            end
        );
        events
    }

    /// Play one note now for `duration` seconds and highlight the note at
    /// `position` while it sounds. Returns the duration used.
    pub fn play_target(
        &mut self,
        mut playback: Playback<'_>,
        note: &NoteSymbol,
        position: usize,
        duration: f64,
    ) -> f64 {
        let audio_now = playback.audio.now();
        playback.start_voice(note, audio_now, duration);

        let highlight_at = playback.wall_now;
        playback
            .timers
            .schedule(highlight_at, &self.token, Task::Highlight { position });
        playback.timers.schedule(
            highlight_at + duration * 1000.0,
            &self.token,
            Task::ClearHighlight,
        );

        debug!("Target {note} for {duration:.3}s at {audio_now:.3}s");
        duration
    }

    /// The sequence-complete timer fired.
    pub fn complete(&mut self) {
        self.completion = None;
    }

    /// Whether a queued sequence has not yet completed.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.completion.is_some()
    }

    /// Cancel every pending highlight, clear and completion timer and force
    /// every registered voice to stop. Safe to call at any time.
    pub fn stop(
        &mut self,
        audio: &mut AudioContext,
        registry: &mut VoiceRegistry,
        timers: &mut TimerQueue<Task>,
    ) {
        self.token.cancel();
        registry.stop_all(audio);
        if let Some(completion) = self.completion.take() {
            timers.cancel(completion);
        }
        timers.purge_cancelled();
        self.token = CancelToken::new();
    }
}
