//! End-to-end CLI tests for the third-api binary.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Command isolated from the user's config, keys and guard state.
fn third_api(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("third-api").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("HOME", home.path())
        .env_remove("RUST_LOG")
        .env_remove("rapidapi_key")
        .env_remove("RAPIDAPI_KEY")
        .env_remove("hikerapi_key")
        .env_remove("HIKERAPI_KEY")
        .env_remove("external_ie")
        .env_remove("EXTERNAL_IE")
        .env_remove("disable_third_api")
        .env_remove("DISABLE_THIRD_API")
        .arg("--guard-file")
        .arg(home.path().join("guard.json"));
    cmd
}

fn write_config(home: &TempDir, body: &str) {
    let dir = home.path().join("config").join("third-api");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("third-party provider APIs"))
        .stdout(predicate::str::contains("--rapidapi-key"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("third-api"));
}

#[test]
fn test_binary_requires_input() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_binary_disabled_refuses_resolution() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .args(["--disable-third-api", "https://vimeo.com/1"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Blocked by local rate limiting"))
        .stderr(predicate::str::contains("disabled"));
}

#[test]
fn test_binary_disabled_from_config_file() {
    let home = TempDir::new().unwrap();
    write_config(&home, "disable_third_api = true\n");
    third_api(&home)
        .arg("https://vimeo.com/1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("disabled"));
}

#[test]
fn test_binary_invalid_config_fails() {
    let home = TempDir::new().unwrap();
    write_config(&home, "unknown_key = 1\n");
    third_api(&home)
        .arg("https://vimeo.com/1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_binary_unknown_provider_lists_available() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .args(["-a", "nope_rapidapi", "https://vimeo.com/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider 'nope_rapidapi'"))
        .stderr(predicate::str::contains("allinone_mutil_rapidapi"));
}

#[test]
fn test_binary_strict_routing_without_affinity_fails() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .args(["--strict", "https://nothing-matches.example/v/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no provider supports"));
}

#[test]
fn test_binary_rejects_conflicting_preferences() {
    let home = TempDir::new().unwrap();
    third_api(&home)
        .args(["--prefer-rapidapi", "--only-rapidapi", "https://vimeo.com/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_resolves_through_external_resolver() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("POST"))
        .and(path("/of/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ExtractResult": {
                "Title": "posts",
                "Medias": [{"PostID": 7, "MediaID": 8, "Type": "video", "IsDrm": false,
                            "MediaURI": "https://cdn.example.com/8.mp4", "Title": "clip"}]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/of/nondrmsecrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Headers": {}})))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let mut cmd = third_api(&home);
    cmd.args(["-q", "--external-ie", &server.uri(), "-a", "external"])
        .arg("https://onlyfans.com/someone");

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["id"], "7_8");
    assert_eq!(result["provider"], "external");
}
