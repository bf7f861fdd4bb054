use assert_cmd::Command;
use predicates::str::contains;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_program(name: &str, source: &str) -> std::path::PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("ilc-cli-{unique}"));
    std::fs::create_dir_all(&root).expect("failed to create temp root");
    let path = root.join(name);
    std::fs::write(&path, source).expect("failed to write program");
    path
}

#[test]
fn help_flag_prints_usage_and_subcommands() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("Soft PLC engine"))
        .stdout(contains("Usage: ilc"))
        .stdout(contains("check"))
        .stdout(contains("run"))
        .stdout(contains("ladder"));
}

#[test]
fn check_accepts_a_clean_program() {
    let input = temp_program("clean.il", "NETWORK 1\nSTR X1\nAND X2\nOUT Y1\n");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    cmd.arg("check")
        .arg(&input)
        .assert()
        .success()
        .stdout(contains("ok"))
        .stdout(contains("1 network(s)"));
}

#[test]
fn check_fails_on_unknown_instructions() {
    let input = temp_program("broken.il", "NETWORK 1\nSTR X1\nWOBBLE Y1\n");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    cmd.arg("check")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("WOBBLE"));
}

#[test]
fn run_executes_until_max_scans() {
    let input = temp_program("counter.il", "NETWORK 1\nSTR SC1\nMATHDEC DS1 0 DS1 + 1\n");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    cmd.arg("run")
        .arg(&input)
        .arg("--max-scans")
        .arg("25")
        .assert()
        .success()
        .stdout(contains("exit: max-scans-reached"))
        .stdout(contains("scans: 25"));
}

#[test]
fn run_honors_end_instructions() {
    let input = temp_program("ends.il", "NETWORK 1\nSTR SC1\nEND\n");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    cmd.arg("run")
        .arg(&input)
        .arg("--max-scans")
        .arg("100")
        .assert()
        .success()
        .stdout(contains("exit: end"))
        .stdout(contains("scans: 1"));
}

#[test]
fn ladder_emits_parseable_json() {
    let input = temp_program("rung.il", "NETWORK 1\nSTR X1\nOR X2\nAND X3\nOUT Y1\n");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ilc"));
    let output = cmd.arg("ladder").arg(&input).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let programs = parsed.as_array().expect("array of programs");
    assert_eq!(programs[0]["subrname"], "main");
    assert_eq!(programs[0]["subrdata"][0]["rungnum"], 1);
}
