use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::ScanError;

/// Captured output of a finished tool invocation.
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Run an external tool under a cancellation token and a deadline.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait on
/// cancellation or timeout terminates the subprocess.
pub async fn run_tool(
    cancel: &CancellationToken,
    deadline: Duration,
    mut command: Command,
) -> Result<ToolOutput, ScanError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScanError::Unavailable(format!("{:?}: binary not found", command.as_std().get_program()))
        } else {
            ScanError::Io(e)
        }
    })?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScanError::Cancelled),
        result = tokio::time::timeout(deadline, child.wait_with_output()) => match result {
            Err(_) => Err(ScanError::Timeout),
            Ok(Err(e)) => Err(ScanError::Io(e)),
            Ok(Ok(output)) => Ok(ToolOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                success: output.status.success(),
            }),
        }
    }
}

/// Readiness probe used by `initialize`: run the tool's version command and
/// check its output mentions the expected marker.
pub async fn check_binary(
    path: &str,
    version_arg: &str,
    expect: &str,
) -> Result<(), ScanError> {
    let mut command = Command::new(path);
    command.arg(version_arg);

    let output = run_tool(
        &CancellationToken::new(),
        Duration::from_secs(15),
        command,
    )
    .await
    .map_err(|e| match e {
        ScanError::Io(e) => ScanError::Unavailable(format!("{path}: {e}")),
        other => other,
    })?;

    let combined = format!("{}{}", output.stdout, output.stderr);
    if !combined.to_lowercase().contains(&expect.to_lowercase()) {
        return Err(ScanError::Unavailable(format!(
            "command '{path}' does not appear to be {expect}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let command = Command::new("definitely-not-a-real-binary-3f9a");
        let result = run_tool(
            &CancellationToken::new(),
            Duration::from_secs(1),
            command,
        )
        .await;

        assert!(matches!(result, Err(ScanError::Unavailable(_))));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo hello"]);

        let output = run_tool(
            &CancellationToken::new(),
            Duration::from_secs(5),
            command,
        )
        .await
        .unwrap();

        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn cancellation_terminates_subprocess() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 30"]);

        let cancel = CancellationToken::new();
        let killer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            killer.cancel();
        });

        let start = std::time::Instant::now();
        let result = run_tool(&cancel, Duration::from_secs(60), command).await;

        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_produces_timeout() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 30"]);

        let result = run_tool(
            &CancellationToken::new(),
            Duration::from_millis(50),
            command,
        )
        .await;

        assert!(matches!(result, Err(ScanError::Timeout)));
    }
}
