//! Spawns the `rolling-perf` binary and checks its exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use rolling_perf::exit_codes;

fn rolling_perf(work: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rolling-perf"))
        .args(["--branch", "main", "--working-directory"])
        .arg(work)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn rolling-perf")
}

#[test]
fn missing_config_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = rolling_perf(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config file not found"), "{stderr}");

    // The invocation log is written even when the run fails.
    let logs: Vec<_> = fs::read_dir(temp.path().join("logs"))
        .expect("logs dir")
        .collect();
    assert_eq!(logs.len(), 1);
}

#[test]
fn unusable_working_directory_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = temp.path().join("work");
    fs::write(&work, "a file, not a directory").expect("blocker");
    let output = rolling_perf(&work, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("can't create log dir"), "{stderr}");
}

#[test]
fn invalid_config_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("rolling-perf.toml"), "[repo]\nurl = \"\"\n").expect("config");
    let output = rolling_perf(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
}

#[test]
fn zero_look_back_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("rolling-perf.toml"),
        "[repo]\nurl = \"https://example.invalid/x.git\"\n[build]\ncommand = [\"true\"]\n[tests]\ncommand = [\"true\"]\n",
    )
    .expect("config");
    let output = rolling_perf(temp.path(), &["--look-back", "0"]);
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
}

#[test]
fn missing_tool_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("rolling-perf.toml"),
        concat!(
            "[repo]\nurl = \"https://example.invalid/x.git\"\n",
            "[build]\ncommand = [\"true\"]\n",
            "[tests]\ncommand = [\"true\"]\n",
            "[[tools]]\nname = \"widget\"\ncheck = [\"definitely-not-installed-rolling-perf\"]\n",
        ),
    )
    .expect("config");
    let output = rolling_perf(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    assert!(String::from_utf8_lossy(&output.stderr).contains("can't find widget"));
}

#[test]
fn unreachable_remote_is_an_internal_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing_remote = temp.path().join("no-such-remote");
    fs::write(
        temp.path().join("rolling-perf.toml"),
        format!(
            "[repo]\nurl = \"{}\"\n[build]\ncommand = [\"true\"]\n[tests]\ncommand = [\"true\"]\n",
            missing_remote.display()
        ),
    )
    .expect("config");
    let output = rolling_perf(temp.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::INTERNAL));
}

#[cfg(unix)]
#[test]
fn submits_then_idles_against_real_remote() {
    use rolling_perf::io::config::{RollingConfig, write_config};
    use rolling_perf::test_support::GitFixture;

    let fixture = GitFixture::new().expect("fixture");
    let tip = fixture.commit("tip").expect("commit");
    let work = fixture.scratch().join("work");
    let mut config = RollingConfig::default();
    config.repo.url = fixture.url();
    config.build.command = vec!["true".to_string()];
    config.tests.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo ok > {{ commit_id }}.test.csv".to_string(),
    ];
    write_config(&work.join("rolling-perf.toml"), &config).expect("write config");

    let output = rolling_perf(&work, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    assert!(
        work.join("results/new")
            .join(tip.as_str())
            .join(format!("{tip}.test.csv"))
            .is_file()
    );

    let store = fs::read_to_string(work.join("store.json")).expect("store");
    let output = rolling_perf(&work, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(fs::read_to_string(work.join("store.json")).expect("store"), store);
}
