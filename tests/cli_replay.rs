use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

// Runs the built binary against a small capture; the config file path points at a
// missing file so the run sees default settings regardless of the host.
#[test]
fn replay_prints_markers_and_writes_the_log() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("capture.csv");
    let out = dir.path().join("logs").join("replay.csv");

    let mut body = String::from("time,w,line\n");
    for i in 0..10 {
        body.push_str(&format!("{:.1},1.0,\"(0.5, -0.5)\"\n", i as f64 * 0.1));
    }
    fs::write(&capture, body).unwrap();

    let output = Command::cargo_bin("legstretch")
        .unwrap()
        .arg("--config-file")
        .arg(dir.path().join("absent.json"))
        .arg("replay")
        .arg(&capture)
        .args(["--max-angle", "40"])
        .arg("--out")
        .arg(&out)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run legstretch replay");

    assert!(output.status.success(), "exit: {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SET_START:1"), "stdout: {}", stdout);
    assert!(stdout.contains("SET_END:1:stopped:0"), "stdout: {}", stdout);
    assert!(stdout.contains("session: 1 sets, 0 reps"), "stdout: {}", stdout);

    // default smoothing window of 7 leaves four frames out of ten lines
    let log = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3 + 4);
    assert_eq!(lines[1], "Target,32.0000");
}

#[test]
fn replay_of_missing_capture_fails() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("legstretch")
        .unwrap()
        .arg("--config-file")
        .arg(dir.path().join("absent.json"))
        .arg("replay")
        .arg(dir.path().join("nope.csv"))
        .args(["--max-angle", "40"])
        .assert()
        .failure();
}

#[test]
fn config_prints_defaults_as_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let output = Command::cargo_bin("legstretch")
        .unwrap()
        .arg("--config-file")
        .arg(&path)
        .args(["config", "--write"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"smoothing_window\": 7"));
    assert!(path.exists());
}
