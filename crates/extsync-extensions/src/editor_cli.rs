//! Editor CLI process wrapper
//!
//! Runs `<binary> --install-extension <file> --force` and
//! `<binary> --uninstall-extension <id>` as child processes. The binary is
//! looked up on `PATH` unless an existing path is given.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::collaborators::{CliOutput, EditorCli, InstallOptions};

/// Printed by VS Code-family CLIs even when they exit with status 0
const FAILURE_MARKER: &str = "Failed Installing Extensions";

/// Upper bound for an uninstall, which has no caller-supplied timeout
const UNINSTALL_TIMEOUT: Duration = Duration::from_secs(60);

/// [`EditorCli`] backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessEditorCli;

impl ProcessEditorCli {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `binary` to something spawnable
    pub fn locate(binary: &Path) -> Result<PathBuf, String> {
        if binary.components().count() > 1 && binary.exists() {
            return Ok(binary.to_path_buf());
        }
        which::which(binary)
            .map_err(|e| format!("editor CLI not found: {} ({})", binary.display(), e))
    }

    async fn run(&self, binary: &Path, args: &[&str], timeout: Duration) -> CliOutput {
        let program = match Self::locate(binary) {
            Ok(program) => program,
            Err(e) => return CliOutput::failed(e),
        };

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program.display(), ?args, "running editor CLI");

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return CliOutput::failed(format!(
                    "Failed to spawn {}: {}",
                    program.display(),
                    e
                ))
            }
            Err(_) => {
                return CliOutput::failed(format!(
                    "{} {} timed out after {}s",
                    program.display(),
                    args.first().copied().unwrap_or_default(),
                    timeout.as_secs()
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let reported_failure = stdout.contains(FAILURE_MARKER) || stderr.contains(FAILURE_MARKER);
        let success = output.status.success() && !reported_failure;

        debug!(
            program = %program.display(),
            status = ?output.status.code(),
            success,
            "editor CLI finished"
        );

        CliOutput {
            success,
            error: None,
            stdout,
            stderr,
            exit_code: output.status.code(),
        }
    }
}

#[async_trait]
impl EditorCli for ProcessEditorCli {
    async fn install(&self, binary: &Path, file: &Path, options: InstallOptions) -> CliOutput {
        let file = file.to_string_lossy();
        let mut args = vec!["--install-extension", file.as_ref()];
        if options.force_reinstall {
            args.push("--force");
        }
        self.run(binary, &args, options.timeout).await
    }

    async fn uninstall(&self, binary: &Path, id: &str) -> CliOutput {
        self.run(binary, &["--uninstall-extension", id], UNINSTALL_TIMEOUT)
            .await
    }
}
