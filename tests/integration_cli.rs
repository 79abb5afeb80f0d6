use assert_cmd::Command;
use chrono::Utc;
use soundspan::{ledger::SqliteLedgerStore, AlertPolicy, SessionLedger, SessionRecord};
use tempfile::{tempdir, TempDir};

/// Binary pointed at a throwaway home, config and ledger
fn soundspan(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("soundspan").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("XDG_STATE_HOME")
        .env_remove("XDG_CONFIG_HOME")
        .arg("--db")
        .arg(home.path().join("ledger.db"))
        .arg("--config")
        .arg(home.path().join("config.json"));
    cmd
}

fn seed_ledger(home: &TempDir, accuracies: &[f64]) {
    let store = SqliteLedgerStore::open(home.path().join("ledger.db")).unwrap();
    let mut ledger = SessionLedger::open(store, AlertPolicy::default()).unwrap();
    for (i, accuracy) in accuracies.iter().enumerate() {
        ledger
            .append(SessionRecord::new(
                Utc::now(),
                *accuracy,
                2100,
                vec!["Dog".into(), "Cat".into(), "Bell".into()],
                vec!["Dog".into(), "Cat".into(), "Rain".into()],
                i as u32 + 1,
                *accuracy == 100.0,
            ))
            .unwrap();
    }
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn history_on_empty_ledger() {
    let home = tempdir().unwrap();
    let out = stdout_of(soundspan(&home).arg("history"));
    assert_eq!(out.trim(), "No trials recorded yet.");
}

#[test]
fn history_lists_newest_first_and_reports_alert() {
    let home = tempdir().unwrap();
    seed_ledger(&home, &[100.0, 33.3, 0.0, 33.3]);

    let out = stdout_of(soundspan(&home).args(["history", "-n", "2"]));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("#4"));
    assert!(lines[1].starts_with("#3"));
    assert!(lines[2].starts_with("ALERT"));
}

#[test]
fn stats_summarises_ledger() {
    let home = tempdir().unwrap();
    seed_ledger(&home, &[100.0, 50.0]);

    let out = stdout_of(soundspan(&home).arg("stats"));
    assert!(out.contains("trials:            2"));
    assert!(out.contains("exact matches:     1"));
    assert!(out.contains("average accuracy:  75.00%"));
    assert!(out.contains("no alert"));
}

#[test]
fn export_writes_csv() {
    let home = tempdir().unwrap();
    seed_ledger(&home, &[100.0, 66.7, 0.0]);
    let csv_path = home.path().join("out.csv");

    let out = stdout_of(soundspan(&home).arg("export").arg(&csv_path));
    assert!(out.contains("exported 3 trials"));
    let text = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn clear_requires_confirmation() {
    let home = tempdir().unwrap();
    seed_ledger(&home, &[100.0]);

    soundspan(&home).arg("clear").assert().failure();
    let out = stdout_of(soundspan(&home).arg("stats"));
    assert!(out.contains("trials:            1"));

    let out = stdout_of(soundspan(&home).args(["clear", "--yes"]));
    assert_eq!(out.trim(), "cleared 1 trials");
    let out = stdout_of(soundspan(&home).arg("history"));
    assert_eq!(out.trim(), "No trials recorded yet.");
}

#[test]
fn play_refuses_without_tty() {
    let home = tempdir().unwrap();
    soundspan(&home).arg("play").assert().failure();
}

#[test]
fn play_rejects_oversized_timing_before_starting() {
    let home = tempdir().unwrap();
    std::fs::write(
        home.path().join("config.json"),
        r#"{"timing": {"lead_in_ms": 9000000000000000000}}"#,
    )
    .unwrap();

    let output = soundspan(&home).arg("play").assert().failure().get_output().clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid trial timing"), "{stderr}");
    assert!(stderr.contains("lead_in_ms"), "{stderr}");
}

#[test]
fn play_rejects_oversized_delay_flag() {
    let home = tempdir().unwrap();
    let output = soundspan(&home)
        .args(["--delay-secs", "100000", "play"])
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("delay_secs"), "{stderr}");
}
