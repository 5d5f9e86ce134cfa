//! CLI integration tests

use std::process::Command;

fn sw(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sw"))
        .args(args)
        .env_remove("SW_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sw(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("StrokeWatch"), "Should show app name");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("board"), "Should show board command");
    assert!(stdout.contains("status"), "Should show status command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sw(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sw"), "Should show binary name");
}

#[test]
fn test_predict_tabular_help() {
    let output = sw(&["predict", "tabular", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for option in ["--age", "--hypertension", "--heart-disease", "--weight", "--height"] {
        assert!(stdout.contains(option), "Should show {} option", option);
    }
}

#[test]
fn test_board_help() {
    let output = sw(&["board", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for command in ["list", "categories", "show", "post", "like", "delete"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

#[test]
fn test_board_post_help() {
    let output = sw(&["board", "post", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--title"), "Should show title option");
    assert!(stdout.contains("--content"), "Should show content option");
    assert!(stdout.contains("free_talk"), "Should show default category");
}

/// Flags outside 0/1 are rejected before any request is made
#[test]
fn test_flag_out_of_range() {
    let output = sw(&[
        "predict",
        "tabular",
        "--age",
        "65",
        "--hypertension",
        "2",
        "--heart-disease",
        "0",
        "--weight",
        "80",
        "--height",
        "170",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hypertension"));
}

#[test]
fn test_image_with_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"not an image").unwrap();

    let output = sw(&["predict", "image", file.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not an accepted image type"));
}

#[test]
fn test_invalid_api_url() {
    let output = sw(&["--api-url", "not a url", "status"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid API URL"));
}
