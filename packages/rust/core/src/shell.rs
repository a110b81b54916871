//! Shell-command execution primitive.
//!
//! Runs a program to completion, captures combined stdout/stderr, and turns
//! non-zero exits into typed errors carrying the output. Commands are not
//! cancellable once started; a hung command blocks its caller.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use bundleworks_shared::{BundleworksError, Result};

/// Run `program` with `args`, optionally in `cwd`, and return the combined
/// stdout + stderr. A spawn failure or non-zero exit is an error.
pub async fn run(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let display = format!("{program} {}", args.join(" "));
    debug!(command = %display, "running command");

    let output = command
        .output()
        .await
        .map_err(|e| BundleworksError::command(&display, e.to_string()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(BundleworksError::command(
            &display,
            format!("{}: {}", output.status, combined.trim()),
        ));
    }

    Ok(combined)
}

/// Split a configured command line into program and arguments.
///
/// Build commands come from config as single strings ("npm run build");
/// splitting is on whitespace, no quoting support.
pub fn split_command(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
