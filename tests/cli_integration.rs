// Integration tests for CLI commands
// These run the built binary against temporary files and a throwaway config.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use tempfile::{NamedTempFile, TempDir};

fn fragnet(config_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fragnet"));
    command
        .arg("--config")
        .arg(config_dir.path().join("config.toml"))
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn test_cli_help() {
    let config_dir = TempDir::new().unwrap();
    let output = fragnet(&config_dir)
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("demo"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("fetch"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let config_dir = TempDir::new().unwrap();
    let output = fragnet(&config_dir)
        .arg("version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("/fragment/1.0.0"));
}

#[test]
fn test_cli_inspect_json() {
    let config_dir = TempDir::new().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[7u8; 2500]).unwrap();

    let output = fragnet(&config_dir)
        .arg("inspect")
        .arg(file.path())
        .args(["--fragment-size", "1024", "--json"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(manifest["total_fragments"], 3);
    assert_eq!(manifest["file_size"], 2500);
    assert_eq!(manifest["fragment_hashes"].as_array().unwrap().len(), 3);
}

#[test]
fn test_cli_inspect_missing_file_fails() {
    let config_dir = TempDir::new().unwrap();
    let output = fragnet(&config_dir)
        .args(["inspect", "/nonexistent/fragnet-input.bin"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_cli_demo() {
    let config_dir = TempDir::new().unwrap();
    let output = fragnet(&config_dir)
        .args(["demo", "--size", "100000", "--nodes", "2"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Verified"));
    assert!(stdout.contains("node2"));
}

#[test]
fn test_cli_invalid_config_fails() {
    let config_dir = TempDir::new().unwrap();
    std::fs::write(
        config_dir.path().join("config.toml"),
        "[fragments]\nfragment_size = 0\n",
    )
    .unwrap();

    let output = fragnet(&config_dir)
        .args(["demo", "--size", "10"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_cli_fetch_from_serving_node() {
    let config_dir = TempDir::new().unwrap();
    std::fs::write(
        config_dir.path().join("config.toml"),
        "[fragments]\nfragment_size = 1024\n",
    )
    .unwrap();

    let data_dir = TempDir::new().unwrap();
    let source = data_dir.path().join("shared.bin");
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &payload).unwrap();

    let mut server = fragnet(&config_dir)
        .arg("serve")
        .arg("--file")
        .arg(&source)
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to start server");

    let mut address = None;
    let mut hashes = Vec::new();
    let stdout = server.stdout.take().unwrap();
    for line in BufReader::new(stdout).lines() {
        let line = line.unwrap();
        if let Some(addr) = line.strip_prefix("Address: ") {
            address = Some(addr.trim().to_string());
        } else if let Some(hash) = line.strip_prefix("  ") {
            hashes.push(hash.trim().to_string());
        } else if line.starts_with("Press Ctrl-C") {
            break;
        }
    }

    let output_path = data_dir.path().join("fetched.bin");
    let result = fragnet(&config_dir)
        .arg("fetch")
        .arg("--peer")
        .arg(address.as_deref().unwrap_or("127.0.0.1:1"))
        .arg("--output")
        .arg(&output_path)
        .args(&hashes)
        .output()
        .expect("Failed to execute command");

    let _ = server.kill();
    let _ = server.wait();

    assert_eq!(hashes.len(), 5);
    assert!(
        result.status.success(),
        "{}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert_eq!(std::fs::read(&output_path).unwrap(), payload);
}
