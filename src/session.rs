use crate::clock::{Clock, SystemClock};
use crate::ledger::{LedgerError, SessionLedger, SessionRecord};
use crate::playback::{SilentPlayer, SoundPlayer};
use crate::scoring::{reaction_time_ms, score};
use crate::stimulus::{sample, Catalog, SoundId, SoundKind, TrialStimuli, TARGET_COUNT};
use crate::trial_clock::{ClockEffect, Phase, TrialClock, TrialTiming};
use crate::upload::{ResultSink, ResultUpload};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

/// In-process commands accepted by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Ready,
    Toggle(SoundId),
    Submit,
    Return,
    /// Tear down the live trial and cancel its timers
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
    Rejected,
}

/// The live unit of play, owned by the session
#[derive(Debug, Clone)]
pub struct Trial {
    pub stimuli: TrialStimuli,
    /// Chosen ids in the order they were picked, never more than three
    pub selection: Vec<SoundId>,
    pub session_number: u32,
    pub started_at: DateTime<Utc>,
    pub selection_window_started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Index into the targets of the most recent sound played
    pub last_played: Option<usize>,
}

impl Trial {
    fn new(stimuli: TrialStimuli, session_number: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            stimuli,
            selection: Vec::with_capacity(TARGET_COUNT),
            session_number,
            started_at,
            selection_window_started_at: None,
            submitted_at: None,
            last_played: None,
        }
    }

    pub fn is_selected(&self, id: SoundId) -> bool {
        self.selection.contains(&id)
    }

    pub fn selection_full(&self) -> bool {
        self.selection.len() >= TARGET_COUNT
    }

    /// Removing is always allowed; adding only while below the cap
    pub fn toggle(&mut self, id: SoundId) -> Toggle {
        if let Some(pos) = self.selection.iter().position(|s| *s == id) {
            self.selection.remove(pos);
            Toggle::Removed
        } else if self.selection_full() || !self.stimuli.display_contains(id) {
            Toggle::Rejected
        } else {
            self.selection.push(id);
            Toggle::Added
        }
    }
}

/// What a command or tick did
#[derive(Debug)]
pub enum SessionEvent {
    /// Command not valid in the current phase, or a capped selection
    Ignored,
    PhaseChanged(Phase),
    SoundPlayed {
        index: usize,
        kind: SoundKind,
    },
    DelayTick {
        remaining: u32,
    },
    Selected(SoundId),
    Deselected(SoundId),
    Submitted {
        record: SessionRecord,
        persisted: Result<(), LedgerError>,
        alert: bool,
    },
}

struct Uploader {
    sink: Box<dyn ResultSink>,
    user_id: i64,
    difficulty: String,
}

/// Drives trials through their phases and records the outcomes.
///
/// Single threaded: callers feed it one command or one tick at a time.
pub struct GameSession {
    catalog: Catalog,
    ledger: SessionLedger,
    trial_clock: TrialClock,
    clock: Box<dyn Clock>,
    rng: Box<dyn RngCore>,
    player: Box<dyn SoundPlayer>,
    uploader: Option<Uploader>,
    trial: Option<Trial>,
    last_record: Option<SessionRecord>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("phase", &self.trial_clock.phase())
            .field("trial", &self.trial)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl GameSession {
    pub fn new(ledger: SessionLedger, timing: TrialTiming) -> Self {
        Self {
            catalog: Catalog::standard(),
            ledger,
            trial_clock: TrialClock::new(timing),
            clock: Box::new(SystemClock),
            rng: Box::new(StdRng::from_entropy()),
            player: Box::new(SilentPlayer::default()),
            uploader: None,
            trial: None,
            last_record: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_rng<R: RngCore + 'static>(mut self, rng: R) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_player<P: SoundPlayer + 'static>(mut self, player: P) -> Self {
        self.player = Box::new(player);
        self
    }

    pub fn with_sink<S: ResultSink + 'static>(
        mut self,
        sink: S,
        user_id: i64,
        difficulty: impl Into<String>,
    ) -> Self {
        self.uploader = Some(Uploader {
            sink: Box::new(sink),
            user_id,
            difficulty: difficulty.into(),
        });
        self
    }

    pub fn phase(&self) -> Phase {
        self.trial_clock.phase()
    }

    pub fn trial(&self) -> Option<&Trial> {
        self.trial.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn timing(&self) -> TrialTiming {
        self.trial_clock.timing()
    }

    pub fn delay_remaining(&self) -> Option<u32> {
        self.trial_clock.delay_remaining()
    }

    /// Outcome of the most recently submitted trial
    pub fn last_record(&self) -> Option<&SessionRecord> {
        self.last_record.as_ref()
    }

    pub fn alert_active(&self) -> bool {
        self.ledger.alert_condition()
    }

    /// Session number the next trial will get
    pub fn next_session_number(&self) -> u32 {
        self.ledger.next_session_number()
    }

    /// Operator-confirmed wipe of the stored history
    pub fn clear_history(&mut self) -> Result<(), LedgerError> {
        self.last_record = None;
        self.ledger.clear_all()
    }

    pub fn on_command(&mut self, command: Command) -> SessionEvent {
        match command {
            Command::Start => self.start(),
            Command::Ready => self.ready(),
            Command::Toggle(id) => self.toggle(id),
            Command::Submit => self.submit(),
            Command::Return => self.finish(),
            Command::Abandon => self.abandon(),
        }
    }

    /// Fire every phase timer that has come due
    pub fn on_tick(&mut self) -> Vec<SessionEvent> {
        let now = self.clock.now();
        let effects = self.trial_clock.advance(now);
        effects
            .into_iter()
            .map(|effect| self.apply(effect, now))
            .collect()
    }

    fn start(&mut self) -> SessionEvent {
        if !self.trial_clock.start() {
            return SessionEvent::Ignored;
        }
        let stimuli = sample(&self.catalog, self.rng.as_mut());
        let session_number = self.ledger.next_session_number();
        info!(
            session_number,
            targets = ?stimuli.target_ids(),
            "trial started"
        );
        self.trial = Some(Trial::new(stimuli, session_number, self.clock.now()));
        SessionEvent::PhaseChanged(Phase::Instructions)
    }

    fn ready(&mut self) -> SessionEvent {
        let Some(sound_count) = self.trial.as_ref().map(|t| t.stimuli.targets.len()) else {
            return SessionEvent::Ignored;
        };
        let effects = self.trial_clock.ready(sound_count, self.clock.now());
        if effects.is_empty() {
            return SessionEvent::Ignored;
        }
        SessionEvent::PhaseChanged(Phase::Listen)
    }

    fn toggle(&mut self, id: SoundId) -> SessionEvent {
        if self.phase() != Phase::Selection {
            return SessionEvent::Ignored;
        }
        let Some(trial) = self.trial.as_mut() else {
            return SessionEvent::Ignored;
        };
        match trial.toggle(id) {
            Toggle::Added => SessionEvent::Selected(id),
            Toggle::Removed => SessionEvent::Deselected(id),
            Toggle::Rejected => SessionEvent::Ignored,
        }
    }

    fn submit(&mut self) -> SessionEvent {
        if self.phase() != Phase::Selection {
            return SessionEvent::Ignored;
        }
        let now = self.clock.now();
        let Some(trial) = self.trial.as_mut() else {
            return SessionEvent::Ignored;
        };
        if trial.selection.len() != TARGET_COUNT {
            debug!(selected = trial.selection.len(), "submit rejected");
            return SessionEvent::Ignored;
        }

        trial.submitted_at = Some(now);
        let window_start = trial.selection_window_started_at.unwrap_or(now);
        let reaction = reaction_time_ms(window_start, now);
        let result = score(&trial.stimuli.target_ids(), &trial.selection);

        let names = |ids: &[SoundId]| -> Vec<String> {
            ids.iter()
                .filter_map(|id| self.catalog.get(*id))
                .map(|s| s.name.to_string())
                .collect()
        };
        let record = SessionRecord::new(
            now,
            result.accuracy,
            reaction,
            names(&trial.stimuli.target_ids()),
            names(&trial.selection),
            trial.session_number,
            result.is_exact_match,
        );
        self.trial_clock.submit();

        info!(
            session_number = record.game_number,
            accuracy = record.accuracy,
            reaction_ms = record.reaction_time_ms,
            exact = record.is_correct,
            "trial submitted"
        );

        let persisted = self.ledger.append(record.clone());
        if let Err(e) = &persisted {
            warn!(error = %e, "failed to persist session record");
        }

        let alert = self.ledger.alert_condition();
        if alert {
            let policy = self.ledger.policy();
            warn!(
                window = policy.window,
                floor = policy.accuracy_floor,
                "performance alert raised"
            );
        }

        if let Some(uploader) = self.uploader.as_mut() {
            let upload =
                ResultUpload::from_record(&record, uploader.user_id, &uploader.difficulty);
            if let Err(e) = uploader.sink.submit(&upload) {
                warn!(error = %e, "result upload failed");
            }
        }

        self.last_record = Some(record.clone());
        SessionEvent::Submitted {
            record,
            persisted,
            alert,
        }
    }

    fn finish(&mut self) -> SessionEvent {
        if !self.trial_clock.finish() {
            return SessionEvent::Ignored;
        }
        self.trial = None;
        SessionEvent::PhaseChanged(Phase::Setup)
    }

    fn abandon(&mut self) -> SessionEvent {
        if self.phase() == Phase::Setup {
            return SessionEvent::Ignored;
        }
        info!(phase = %self.phase(), "trial abandoned");
        self.trial_clock.reset();
        self.trial = None;
        SessionEvent::PhaseChanged(Phase::Setup)
    }

    fn apply(&mut self, effect: ClockEffect, now: DateTime<Utc>) -> SessionEvent {
        match effect {
            ClockEffect::PlaySound { index } => {
                let Some(trial) = self.trial.as_mut() else {
                    return SessionEvent::Ignored;
                };
                let Some(kind) = trial.stimuli.targets.get(index).map(|s| s.kind) else {
                    return SessionEvent::Ignored;
                };
                trial.last_played = Some(index);
                if let Err(e) = self.player.play(kind) {
                    warn!(%kind, error = %e, "sound playback failed");
                }
                SessionEvent::SoundPlayed { index, kind }
            }
            ClockEffect::DelayTick { remaining } => SessionEvent::DelayTick { remaining },
            ClockEffect::PhaseChanged(phase) => {
                if phase == Phase::Selection {
                    if let Some(trial) = self.trial.as_mut() {
                        trial.selection_window_started_at = Some(now);
                    }
                }
                debug!(%phase, "phase reached");
                SessionEvent::PhaseChanged(phase)
            }
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.trial_clock.reset();
    }
}
