//! `solc --standard-json` subprocess.

use super::{Compiler, CompilerError, CompilerInput, CompilerOutput};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Maximum stderr carried into an error message.
const MAX_STDERR: usize = 4096;

/// Runs a `solc` binary once per compilation.
#[derive(Debug, Clone)]
pub struct SolcProcess {
    binary: PathBuf,
}

impl SolcProcess {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for SolcProcess {
    fn default() -> Self {
        Self::new("solc")
    }
}

#[async_trait]
impl Compiler for SolcProcess {
    fn name(&self) -> &str {
        "solc"
    }

    async fn compile(&self, input: CompilerInput) -> Result<CompilerOutput, CompilerError> {
        let body = serde_json::to_vec(&input.to_standard_json())
            .map_err(|e| CompilerError::io_error(format!("Failed to encode input: {e}")))?;
        debug!(
            binary = %self.binary.display(),
            entry = %input.target,
            sources = input.sources.len(),
            "Running solc"
        );

        let mut child = Command::new(&self.binary)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    CompilerError::not_found(format!("{} not found", self.binary.display()))
                }
                _ => CompilerError::io_error(format!(
                    "Failed to start {}: {e}",
                    self.binary.display()
                )),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&body)
                .await
                .map_err(|e| CompilerError::io_error(format!("Failed to write input: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CompilerError::io_error(format!("Failed to wait for solc: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR).collect();
            return Err(CompilerError::failed(format!(
                "{} exited with {}: {stderr}",
                self.binary.display(),
                output.status
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| CompilerError::invalid_output(format!("solc output is not JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::codes;
    use serial_test::serial;

    #[tokio::test]
    async fn test_missing_binary() {
        let solc = SolcProcess::new("/nonexistent/solc-binary");
        let err = solc
            .compile(CompilerInput::from_entry("A.sol", "contract A {}"))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::COMPILER_NOT_FOUND);
    }

    #[cfg(unix)]
    fn fake_solc(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("solc");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_reads_standard_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_solc(
            dir.path(),
            "#!/bin/sh\ncat > /dev/null\necho '{\"contracts\":{},\"sources\":{}}'\n",
        );

        let output = SolcProcess::new(binary)
            .compile(CompilerInput::from_entry("A.sol", "contract A {}"))
            .await
            .unwrap();
        assert!(output["contracts"].is_object());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_solc(dir.path(), "#!/bin/sh\ncat > /dev/null\necho boom >&2\nexit 3\n");

        let err = SolcProcess::new(binary)
            .compile(CompilerInput::from_entry("A.sol", "contract A {}"))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::COMPILER_FAILED);
        assert!(err.message.contains("boom"));
    }
}
