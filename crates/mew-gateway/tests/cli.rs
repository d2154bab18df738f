// SPDX-License-Identifier: MIT OR Apache-2.0
//! Smoke tests for the `mew-gatewayd` binary's argument handling.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn help_describes_the_gateway() {
    Command::cargo_bin("mew-gatewayd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("MEW workspace gateway"));
}

#[test]
fn missing_config_argument_is_rejected() {
    Command::cargo_bin("mew-gatewayd")
        .unwrap()
        .assert()
        .failure()
        .stderr(contains("--config"));
}

#[test]
fn nonexistent_config_file_fails_with_context() {
    Command::cargo_bin("mew-gatewayd")
        .unwrap()
        .args(["--config", "/nonexistent/space.toml"])
        .assert()
        .failure()
        .stderr(contains("space.toml"));
}
