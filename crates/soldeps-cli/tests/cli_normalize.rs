//! Integration tests for `soldeps normalize` and `soldeps version`.

use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "soldeps-cli", "--bin", "soldeps", "--"]);
    cmd
}

fn normalize_json(reference: &str) -> serde_json::Value {
    let output = cargo_bin()
        .args(["--json", "normalize", reference])
        .output()
        .expect("Failed to run soldeps");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("normalize --json prints one JSON object")
}

#[test]
fn test_normalize_github_blob() {
    let result = normalize_json(
        "https://github.com/openzeppelin/openzeppelin-contracts/blob/v5.0.2/contracts/token/ERC20/ERC20.sol",
    );
    assert_eq!(result["kind"], "github");
    assert_eq!(
        result["canonicalPath"],
        "github/openzeppelin/openzeppelin-contracts@v5.0.2/contracts/token/ERC20/ERC20.sol"
    );
    assert!(result["fetchUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://raw.githubusercontent.com/"));
}

#[test]
fn test_normalize_npm_and_local() {
    let npm = normalize_json("@openzeppelin/contracts/token/ERC20/ERC20.sol");
    assert_eq!(npm["kind"], "npm");
    assert!(npm.get("fetchUrl").is_none());

    let local = normalize_json("./lib/../Token.sol");
    assert_eq!(local["kind"], "local");
    assert_eq!(local["canonicalPath"], "Token.sol");
}

#[test]
fn test_normalize_text() {
    let output = cargo_bin()
        .args(["normalize", "ipfs://QmHash/path/file.sol"])
        .output()
        .expect("Failed to run soldeps");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("kind:      ipfs"));
}

#[test]
fn test_version() {
    let output = cargo_bin().arg("version").output().expect("Failed to run soldeps");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("soldeps "));
}
