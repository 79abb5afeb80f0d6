use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed per-phase durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialTiming {
    /// Pause before the first sound
    pub lead_in_ms: u64,
    /// Gap after each sound, including the last one
    pub inter_stimulus_ms: u64,
    /// Length of the enforced retention countdown
    pub delay_secs: u32,
}

impl Default for TrialTiming {
    fn default() -> Self {
        Self {
            lead_in_ms: 800,
            inter_stimulus_ms: 1500,
            delay_secs: 8,
        }
    }
}

/// Longest accepted lead-in or inter-stimulus gap
pub const MAX_STEP_MS: u64 = 60_000;
/// Longest accepted retention countdown
pub const MAX_DELAY_SECS: u32 = 600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimingError {
    #[error("{field} is {value} ms, the limit is 60000 ms")]
    StepTooLong { field: &'static str, value: u64 },
    #[error("delay_secs is {0}, the limit is 600 s")]
    DelayTooLong(u32),
}

impl TrialTiming {
    /// Reject durations a trial could not sensibly run with
    pub fn validate(&self) -> Result<(), TimingError> {
        for (field, value) in [
            ("lead_in_ms", self.lead_in_ms),
            ("inter_stimulus_ms", self.inter_stimulus_ms),
        ] {
            if value > MAX_STEP_MS {
                return Err(TimingError::StepTooLong { field, value });
            }
        }
        if self.delay_secs > MAX_DELAY_SECS {
            return Err(TimingError::DelayTooLong(self.delay_secs));
        }
        Ok(())
    }

    /// Wall time from entering Listen until the recall window opens
    pub fn total_before_selection(&self, sound_count: usize) -> Duration {
        let listen_ms = self
            .inter_stimulus_ms
            .saturating_mul(sound_count as u64)
            .saturating_add(self.lead_in_ms);
        millis(listen_ms)
            .checked_add(&Duration::seconds(i64::from(self.delay_secs)))
            .unwrap_or(Duration::MAX)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// `at + by`, pinned to the far future instead of overflowing
fn due_after(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Phase {
    Setup,
    Instructions,
    Listen,
    Delay,
    Selection,
    Feedback,
}

/// Handle for a scheduled phase timer. Only the most recently issued token is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    PlaySound(usize),
    EndListen,
    DelayTick,
}

#[derive(Debug, Clone, Copy)]
struct PhaseTimer {
    token: TimerToken,
    due_at: DateTime<Utc>,
    kind: TimerKind,
}

/// Something the sequencer wants the owner to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEffect {
    PhaseChanged(Phase),
    PlaySound { index: usize },
    DelayTick { remaining: u32 },
}

/// Phase sequencer: Setup -> Instructions -> Listen -> Delay -> Selection -> Feedback -> Setup.
///
/// Listen and Delay advance on their own through a single pending timer;
/// every other transition is an explicit call. Any transition cancels the
/// pending timer before scheduling the next one.
#[derive(Debug)]
pub struct TrialClock {
    timing: TrialTiming,
    phase: Phase,
    sound_count: usize,
    delay_remaining: u32,
    pending: Option<PhaseTimer>,
    issued: u64,
}

impl TrialClock {
    pub fn new(timing: TrialTiming) -> Self {
        Self {
            timing,
            phase: Phase::Setup,
            sound_count: 0,
            delay_remaining: 0,
            pending: None,
            issued: 0,
        }
    }

    pub fn timing(&self) -> TrialTiming {
        self.timing
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seconds left on the retention countdown, while in Delay
    pub fn delay_remaining(&self) -> Option<u32> {
        (self.phase == Phase::Delay).then_some(self.delay_remaining)
    }

    pub fn pending_token(&self) -> Option<TimerToken> {
        self.pending.map(|t| t.token)
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.map(|t| t.due_at)
    }

    /// Setup -> Instructions
    pub fn start(&mut self) -> bool {
        self.transition(Phase::Setup, Phase::Instructions)
    }

    /// Instructions -> Listen, scheduling playback of `sound_count` sounds from the first
    pub fn ready(&mut self, sound_count: usize, now: DateTime<Utc>) -> Vec<ClockEffect> {
        if !self.transition(Phase::Instructions, Phase::Listen) {
            return Vec::new();
        }
        self.sound_count = sound_count;
        let effects = vec![ClockEffect::PhaseChanged(Phase::Listen)];
        let lead_in = due_after(now, millis(self.timing.lead_in_ms));
        if sound_count == 0 {
            self.schedule(lead_in, TimerKind::EndListen);
        } else {
            self.schedule(lead_in, TimerKind::PlaySound(0));
        }
        effects
    }

    /// Selection -> Feedback
    pub fn submit(&mut self) -> bool {
        self.transition(Phase::Selection, Phase::Feedback)
    }

    /// Feedback -> Setup
    pub fn finish(&mut self) -> bool {
        self.transition(Phase::Feedback, Phase::Setup)
    }

    /// Drop back to Setup from any phase, cancelling the pending timer
    pub fn reset(&mut self) {
        self.cancel();
        self.phase = Phase::Setup;
        self.sound_count = 0;
        self.delay_remaining = 0;
    }

    /// Cancel the pending timer, if any
    pub fn cancel(&mut self) {
        if let Some(timer) = self.pending.take() {
            debug!(token = timer.token.0, phase = %self.phase, "cancelled phase timer");
        }
    }

    /// Fire every timer that is due at `now`, in schedule order
    pub fn advance(&mut self, now: DateTime<Utc>) -> Vec<ClockEffect> {
        let mut effects = Vec::new();
        while let Some(timer) = self.pending {
            if timer.due_at > now {
                break;
            }
            effects.extend(self.fire(timer.token));
        }
        effects
    }

    /// Fire the timer identified by `token`. Stale tokens are ignored.
    pub fn fire(&mut self, token: TimerToken) -> Vec<ClockEffect> {
        let timer = match self.pending {
            Some(timer) if timer.token == token => timer,
            _ => {
                debug!(token = token.0, "ignored stale phase timer");
                return Vec::new();
            }
        };
        self.pending = None;
        let due = timer.due_at;
        let gap = millis(self.timing.inter_stimulus_ms);

        match timer.kind {
            TimerKind::PlaySound(index) => {
                let next = index + 1;
                if next < self.sound_count {
                    self.schedule(due_after(due, gap), TimerKind::PlaySound(next));
                } else {
                    self.schedule(due_after(due, gap), TimerKind::EndListen);
                }
                vec![ClockEffect::PlaySound { index }]
            }
            TimerKind::EndListen => {
                self.phase = Phase::Delay;
                self.delay_remaining = self.timing.delay_secs;
                let mut effects = vec![ClockEffect::PhaseChanged(Phase::Delay)];
                if self.delay_remaining == 0 {
                    effects.extend(self.open_selection());
                } else {
                    self.schedule(due_after(due, Duration::seconds(1)), TimerKind::DelayTick);
                }
                effects
            }
            TimerKind::DelayTick => {
                self.delay_remaining = self.delay_remaining.saturating_sub(1);
                let mut effects = vec![ClockEffect::DelayTick {
                    remaining: self.delay_remaining,
                }];
                if self.delay_remaining == 0 {
                    effects.extend(self.open_selection());
                } else {
                    self.schedule(due_after(due, Duration::seconds(1)), TimerKind::DelayTick);
                }
                effects
            }
        }
    }

    fn open_selection(&mut self) -> Vec<ClockEffect> {
        self.cancel();
        self.phase = Phase::Selection;
        vec![ClockEffect::PhaseChanged(Phase::Selection)]
    }

    fn transition(&mut self, from: Phase, to: Phase) -> bool {
        if self.phase != from {
            return false;
        }
        self.cancel();
        debug!(%from, %to, "phase transition");
        self.phase = to;
        true
    }

    fn schedule(&mut self, due_at: DateTime<Utc>, kind: TimerKind) {
        self.cancel();
        self.issued += 1;
        self.pending = Some(PhaseTimer {
            token: TimerToken(self.issued),
            due_at,
            kind,
        });
    }
}
