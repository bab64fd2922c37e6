// Subprocess helpers for driving yt-dlp

use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::errors::EngineError;

/// Locate the yt-dlp binary, honoring an explicit override first.
pub fn find_ytdlp(override_path: Option<&str>) -> String {
    if let Some(path) = override_path {
        return path.to_string();
    }
    if let Ok(path) = std::env::var("YTDLP_PATH") {
        if !path.trim().is_empty() {
            return path;
        }
    }

    // Common installation paths, then PATH lookup
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
    ];
    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Last resort: hope it's in PATH
    "yt-dlp".to_string()
}

/// Run a command, capture stdout/stderr, and kill it on deadline.
pub async fn run_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, EngineError> {
    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::ExecutionError(format!("Failed to start {}: {}", program, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::ExecutionError(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::ExecutionError(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| EngineError::ExecutionError(format!("Failed to wait for {}: {}", program, e)))?;
            let stdout = stdout_task
                .await
                .map_err(|e| EngineError::ExecutionError(format!("stdout task failed: {}", e)))?
                .map_err(EngineError::ExecutionError)?;
            let stderr = stderr_task
                .await
                .map_err(|e| EngineError::ExecutionError(format!("stderr task failed: {}", e)))?
                .map_err(EngineError::ExecutionError)?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(EngineError::NetworkTimeout)
        }
    }
}
