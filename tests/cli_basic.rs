//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, and the offline
//! subcommands (`check-url`, `overlay`) behave on real files.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `yomibot` binary.
fn yomibot() -> Command {
    Command::cargo_bin("yomibot").expect("binary 'yomibot' should be built")
}

/// Scratch directory unique to this test process and `name`.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("yomibot-cli-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// An empty config file, i.e. all defaults, so tests never read the user's.
fn empty_config(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, "").expect("write config");
    path
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    yomibot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: yomibot"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("overlay"))
        .stdout(predicate::str::contains("check-url"));
}

#[test]
fn version_flag_shows_semver() {
    yomibot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^yomibot \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_is_an_error() {
    yomibot()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn overlay_help_lists_arguments() {
    yomibot()
        .args(["overlay", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<IMAGE>"))
        .stdout(predicate::str::contains("<REGIONS>"))
        .stdout(predicate::str::contains("<OUTPUT>"))
        .stdout(predicate::str::contains("--font"));
}

// ─── check-url ───────────────────────────────────────────────────────────────

#[test]
fn check_url_accepts_reddit_image_host() {
    let dir = scratch("allowed");
    let config = empty_config(&dir);
    yomibot()
        .args(["check-url", "https://i.redd.it/abc123.png", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("allowed: i.redd.it"));
}

#[test]
fn check_url_rejects_unknown_host() {
    let dir = scratch("rejected");
    let config = empty_config(&dir);
    yomibot()
        .args(["check-url", "https://example.com/page.png", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));
}

#[test]
fn check_url_rejects_unparsable_url() {
    let dir = scratch("unparsable");
    let config = empty_config(&dir);
    yomibot()
        .args(["check-url", "not a url", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));
}

#[test]
fn check_url_honors_configured_hosts() {
    let dir = scratch("custom-hosts");
    let config = dir.join("config.toml");
    std::fs::write(&config, "[gates]\nallowed_hosts = [\"cdn.example.org\"]\n").unwrap();
    yomibot()
        .args(["check-url", "https://cdn.example.org/x.png", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("allowed: cdn.example.org"));
}

#[test]
fn missing_explicit_config_fails() {
    yomibot()
        .args(["check-url", "https://i.redd.it/a.png", "--config", "/nonexistent/yomibot.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"));
}

// ─── overlay ─────────────────────────────────────────────────────────────────

#[test]
fn overlay_with_missing_regions_file_fails() {
    let dir = scratch("no-regions");
    let config = empty_config(&dir);
    yomibot()
        .arg("overlay")
        .arg(dir.join("in.png"))
        .arg(dir.join("missing.json"))
        .arg(dir.join("out.png"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn overlay_with_missing_font_fails() {
    let dir = scratch("no-font");
    let config = empty_config(&dir);
    let regions = dir.join("regions.json");
    std::fs::write(&regions, "[]").unwrap();
    yomibot()
        .arg("overlay")
        .arg(dir.join("in.png"))
        .arg(&regions)
        .arg(dir.join("out.png"))
        .arg("--font")
        .arg(dir.join("no-such-font.ttf"))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-font.ttf"));
}

#[test]
fn overlay_with_default_font_writes_png() {
    let dir = scratch("default-font");
    let config = empty_config(&dir);
    let input = dir.join("in.png");
    image::RgbaImage::from_pixel(300, 200, image::Rgba([120, 0, 0, 255]))
        .save(&input)
        .unwrap();
    let regions = dir.join("regions.json");
    std::fs::write(
        &regions,
        r#"[{"originalLanguage":"jp","translatedText":"HELLO WORLD","minX":10,"minY":10,"maxX":210,"maxY":60}]"#,
    )
    .unwrap();
    let output = dir.join("out.png");

    yomibot()
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .arg("overlay")
        .arg(&input)
        .arg(&regions)
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 bubbles, 1 text blocks, 0 unfitted"));

    let written = image::open(&output).unwrap().to_rgba8();
    assert_eq!(written.dimensions(), (300, 200));
    assert_eq!(*written.get_pixel(100, 12), image::Rgba([255, 255, 255, 255]));
}
