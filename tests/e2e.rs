use std::io::Write;
use std::process::Command;

use tempfile::Builder;

const HEADER: &str = "account,balance,ledger,active,restricted";

fn run_path(path: &str, seed: Option<&str>) -> (String, String, bool) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wager-eng"));
    command.arg(path).env("RUST_LOG", "warn");
    if let Some(seed) = seed {
        command.arg(seed);
    }
    let output = command.output().expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run(fixture: &str) -> (String, String, bool) {
    run_path(&format!("tests/fixtures/{fixture}"), None)
}

#[test]
fn valid_commands() {
    let (stdout, stderr, success) = run("valid.csv");

    assert!(success);
    assert!(stderr.is_empty());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            HEADER,
            "1,0.00,0.00,true,false",
            "2,1450.00,1450.00,true,false",
            "3,50.00,50.00,true,false",
        ]
    );
}

#[test]
fn tournament_pays_top_three_and_restriction_blocks_debits() {
    let (stdout, stderr, success) = run("tournament.csv");

    assert!(success);
    assert!(stderr.is_empty());

    // 100 deposited, 10 entry fee, then 50/30/20 of a 1000 pool by score;
    // the restricted fourth place cannot withdraw
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            HEADER,
            "1,0.00,0.00,true,false",
            "2,590.00,590.00,true,false",
            "3,290.00,290.00,true,false",
            "4,390.00,390.00,true,false",
            "5,90.00,90.00,true,true",
        ]
    );
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run("with_errors.csv");

    assert!(success);
    assert!(stderr.contains("unrecognized command type"));
    assert!(stderr.contains("missing amount"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[1], "1,75.00,75.00,true,false");
}

#[test]
fn missing_file_fails() {
    let (stdout, stderr, success) = run("does_not_exist.csv");

    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("failed to open commands file"));
}

#[test]
fn seeded_games_are_reproducible_and_balanced() {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "type,account,target,item,amount,limit,detail").unwrap();
    writeln!(file, "open_account,,,,,,administrator").unwrap();
    writeln!(file, "open_account,,,,,,player").unwrap();
    writeln!(file, "deposit,2,,,500,,").unwrap();
    writeln!(file, "create_game,1,,,1,50,slots").unwrap();
    writeln!(file, "create_game,1,,,1,50,dice").unwrap();
    for round in 0..40 {
        writeln!(file, "play,2,{},,10,,", round % 2 + 1).unwrap();
    }
    file.flush().unwrap();
    let path = file.path().to_str().unwrap();

    let (first, _, success) = run_path(path, Some("7"));
    assert!(success);
    let (second, _, _) = run_path(path, Some("7"));
    assert_eq!(first, second);

    for line in first.lines().skip(1) {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields[1], fields[2], "balance drifted from ledger: {line}");
    }
}
