use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CommandOutput {
    /// Program and arguments as run; empty for outputs not produced by
    /// [`run_command`].
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            command: String::new(),
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Exit code, with a process killed by a signal reported as -1.
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    pub fn success(&self) -> bool {
        self.code() == 0
    }

    /// Best single line of diagnostics: stderr if present, otherwise the
    /// last non-empty stdout line (DISM reports errors on stdout).
    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default()
            .to_string()
    }
}

fn configure_command_common(cmd: &mut Command, workdir: Option<&Path>) {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
}

/// Run `program` to completion and capture its output. Only a failure to
/// start the process is an error; a non-zero exit is left to the caller.
pub fn run_command(program: &Path, args: &[&str], workdir: Option<&Path>) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    configure_command_common(&mut cmd, workdir);
    let output = cmd.output().map_err(|e| {
        AppError::Message(format!("Failed to run {}: {e}", program.display()))
    })?;
    let output = CommandOutput {
        command: command_line(program, args),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    log_command(workdir, &output);
    Ok(output)
}

/// Render a command line for error messages.
pub fn command_line(program: &Path, args: &[&str]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn log_command(workdir: Option<&Path>, output: &CommandOutput) {
    let mut parts = Vec::new();
    parts.push(format!("cmd={}", output.command));
    if let Some(dir) = workdir {
        parts.push(format!("cwd={}", dir.display()));
    }
    if let Some(code) = output.exit_code {
        parts.push(format!("exit={code}"));
    }
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    if !stderr.is_empty() {
        parts.push(format!("stderr={stderr}"));
    } else if !stdout.is_empty() {
        parts.push(format!("stdout={stdout}"));
    }
    info!("{}", parts.join(" | "));
}
