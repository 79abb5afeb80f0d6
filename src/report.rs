use itertools::Itertools;
use soundspan::{ledger::SessionRecord, SessionLedger};

/// Plain-text rendering of one ledger row for the history listing
pub fn present_row(record: &SessionRecord) -> String {
    let verdict = if record.is_correct { "exact" } else { "" };
    format!(
        "#{:<4} {}  {:>5.1}%  {:>6.2}s  {:<5}  heard: {}  picked: {}",
        record.game_number,
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.accuracy,
        record.reaction_time_ms as f64 / 1000.0,
        verdict,
        record.correct_sounds.iter().join(", "),
        record.selected_sounds.iter().join(", "),
    )
}

fn alert_summary(ledger: &SessionLedger) -> String {
    let policy = ledger.policy();
    if ledger.alert_condition() {
        format!(
            "ALERT: {} of the last {} trials scored below {:.0}%",
            policy.min_low_trials, policy.window, policy.accuracy_floor
        )
    } else {
        "no alert".to_string()
    }
}

pub fn history_lines(ledger: &SessionLedger, limit: usize) -> Vec<String> {
    if ledger.is_empty() {
        return vec!["No trials recorded yet.".to_string()];
    }
    let mut lines: Vec<String> = ledger
        .history(Some(limit))
        .into_iter()
        .map(present_row)
        .collect();
    lines.push(alert_summary(ledger));
    lines
}

pub fn stats_lines(ledger: &SessionLedger) -> Vec<String> {
    let stats = ledger.stats();
    vec![
        format!("trials:            {}", stats.total_trials),
        format!("exact matches:     {}", stats.exact_matches),
        format!("average accuracy:  {:.2}%", stats.average_accuracy),
        format!("best accuracy:     {:.2}%", stats.best_accuracy),
        format!(
            "average reaction:  {:.0} ms (sd {:.0} ms)",
            stats.average_reaction_ms, stats.reaction_std_dev_ms
        ),
        format!(
            "time in recall:    {:.1}s",
            stats.total_reaction_ms as f64 / 1000.0
        ),
        alert_summary(ledger),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soundspan::AlertPolicy;

    fn record(n: u32, accuracy: f64) -> SessionRecord {
        SessionRecord::new(
            Utc::now(),
            accuracy,
            2500,
            vec!["Dog".into(), "Cat".into(), "Bell".into()],
            vec!["Dog".into(), "Cat".into(), "Drum".into()],
            n,
            accuracy == 100.0,
        )
    }

    #[test]
    fn test_present_row() {
        let row = present_row(&record(3, 200.0 / 3.0));
        assert!(row.starts_with("#3"));
        assert!(row.contains(" 66.7%"));
        assert!(row.contains("2.50s"));
        assert!(row.contains("heard: Dog, Cat, Bell"));
        assert!(row.contains("picked: Dog, Cat, Drum"));
    }

    #[test]
    fn test_history_lines_empty() {
        let ledger = SessionLedger::in_memory(AlertPolicy::default());
        assert_eq!(history_lines(&ledger, 5), vec!["No trials recorded yet."]);
    }

    #[test]
    fn test_history_lines_reports_alert() {
        let mut ledger = SessionLedger::in_memory(AlertPolicy::default());
        for n in 1..=3 {
            ledger.append(record(n, 33.3)).unwrap();
        }
        let lines = history_lines(&ledger, 2);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#3"));
        assert!(lines[2].starts_with("ALERT"));
    }

    #[test]
    fn test_stats_lines() {
        let mut ledger = SessionLedger::in_memory(AlertPolicy::default());
        ledger.append(record(1, 100.0)).unwrap();
        let lines = stats_lines(&ledger);
        assert_eq!(lines[0], "trials:            1");
        assert_eq!(lines[1], "exact matches:     1");
        assert_eq!(lines.last().unwrap(), "no alert");
    }
}
