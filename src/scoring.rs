use crate::stimulus::SoundId;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Outcome of comparing a selection against the targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub is_exact_match: bool,
    /// Percentage in `0.0..=100.0`
    pub accuracy: f64,
}

/// Score a selection against the targets. Both sides are treated as sets,
/// so ordering and repeated ids make no difference.
pub fn score(targets: &[SoundId], selection: &[SoundId]) -> Score {
    let targets: HashSet<SoundId> = targets.iter().copied().collect();
    let selection: HashSet<SoundId> = selection.iter().copied().collect();

    let is_exact_match = targets == selection && !targets.is_empty();
    if is_exact_match {
        return Score {
            is_exact_match,
            accuracy: 100.0,
        };
    }

    let denominator = targets.len().max(selection.len());
    let accuracy = if denominator == 0 {
        0.0
    } else {
        let correct = selection.intersection(&targets).count();
        100.0 * correct as f64 / denominator as f64
    };

    Score {
        is_exact_match,
        accuracy,
    }
}

/// Milliseconds between the recall window opening and submission, clamped at zero
pub fn reaction_time_ms(window_started_at: DateTime<Utc>, submitted_at: DateTime<Utc>) -> u64 {
    (submitted_at - window_started_at).num_milliseconds().max(0) as u64
}
