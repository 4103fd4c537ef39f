//! FFmpeg-family process management for storyreel.
//!
//! This module handles spawning, monitoring, and terminating the `ffmpeg`,
//! `ffplay` and `ffprobe` processes used for playback and export.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// External media tools storyreel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffplay,
    Ffprobe,
}

impl Tool {
    pub fn program(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffplay => "ffplay",
            Tool::Ffprobe => "ffprobe",
        }
    }
}

/// Errors that can occur during pipeline operations
#[derive(Debug)]
pub enum PipelineError {
    /// Executable not found on PATH
    ToolNotFound(Tool),
    /// Failed to spawn the process
    SpawnFailed { tool: Tool, source: std::io::Error },
    /// Process exited with non-zero status
    ProcessFailed {
        tool: Tool,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Pipeline was interrupted by Ctrl+C
    Interrupted,
    /// I/O error during pipeline operation
    IoError(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::ToolNotFound(tool) => write!(
                f,
                "{} not found. Please install FFmpeg (it provides ffmpeg, ffplay and ffprobe).",
                tool.program()
            ),
            PipelineError::SpawnFailed { tool, source } => {
                write!(f, "Failed to spawn {}: {}", tool.program(), source)
            }
            PipelineError::ProcessFailed {
                tool,
                exit_code,
                stderr,
            } => write!(
                f,
                "{} exited with code {:?}\n{}",
                tool.program(),
                exit_code,
                stderr
            ),
            PipelineError::Interrupted => write!(f, "Pipeline interrupted"),
            PipelineError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::SpawnFailed { source, .. } => Some(source),
            PipelineError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IoError(e)
    }
}

/// Whether `tool` can be executed from PATH.
pub fn is_tool_on_path(tool: Tool) -> bool {
    Command::new(tool.program())
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A running ffmpeg-family process.
pub struct Pipeline {
    tool: Tool,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl Pipeline {
    /// Spawn `tool` with `args` and the given stdin/stdout wiring.
    ///
    /// Stderr is always captured on a background thread so a chatty process
    /// never blocks on a full pipe.
    pub fn spawn(tool: Tool, args: &[String], stdin: Stdio, stdout: Stdio) -> Result<Self, PipelineError> {
        log::debug!("Spawning {} {}", tool.program(), args.join(" "));

        let mut cmd = Command::new(tool.program());
        cmd.args(args).stdin(stdin).stdout(stdout).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ToolNotFound(tool)
            } else {
                PipelineError::SpawnFailed { tool, source: e }
            }
        })?;

        let stderr = child.stderr.take();
        let stderr_thread = stderr.map(|stderr| {
            let program = tool.program();
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[{}] {}", program, l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        let stdin = child.stdin.take();
        Ok(Pipeline {
            tool,
            child,
            stdin,
            stderr_thread,
        })
    }

    /// A process fed through stdin (e.g. a raw-frame encoder).
    pub fn writer(tool: Tool, args: &[String]) -> Result<Self, PipelineError> {
        Self::spawn(tool, args, Stdio::piped(), Stdio::null())
    }

    /// A process read through stdout (e.g. a raw-frame decoder or an ffprobe query).
    pub fn reader(tool: Tool, args: &[String]) -> Result<Self, PipelineError> {
        Self::spawn(tool, args, Stdio::null(), Stdio::piped())
    }

    /// A process with no data pipes (e.g. a player).
    pub fn detached(tool: Tool, args: &[String]) -> Result<Self, PipelineError> {
        Self::spawn(tool, args, Stdio::null(), Stdio::null())
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// The stdin pipe, until it is closed.
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// The stdout pipe for reading output.
    pub fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.child.stdout.as_mut()
    }

    /// Close stdin so the process sees end of input.
    pub fn close_stdin(&mut self) {
        drop(self.stdin.take());
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Poll for exit without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, PipelineError> {
        self.child.try_wait().map_err(PipelineError::IoError)
    }

    /// Wait for the process to complete and return the exit status.
    pub fn wait(&mut self) -> Result<ExitStatus, PipelineError> {
        self.child.wait().map_err(PipelineError::IoError)
    }

    /// Close stdin, wait, and turn a non-zero exit into `ProcessFailed`.
    pub fn finish(mut self) -> Result<(), PipelineError> {
        self.close_stdin();
        let status = self.wait()?;
        if status.success() {
            return Ok(());
        }
        Err(PipelineError::ProcessFailed {
            tool: self.tool,
            exit_code: status.code(),
            stderr: self.take_stderr_output().join("\n"),
        })
    }

    /// Request a graceful shutdown.
    ///
    /// This sends SIGINT and waits for the process to terminate.
    /// If it doesn't exit within the timeout, SIGKILL is sent.
    pub fn shutdown(&mut self) -> Result<ExitStatus, PipelineError> {
        self.close_stdin();

        #[cfg(unix)]
        {
            unsafe {
                let pid = self.child.id() as i32;
                libc::kill(pid, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        let timeout = Duration::from_secs(2);

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = self.child.kill();
                        return self.child.wait().map_err(PipelineError::IoError);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(PipelineError::IoError(e)),
            }
        }
    }

    /// Kill the process immediately and reap it.
    pub fn kill(&mut self) {
        self.close_stdin();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Get the collected stderr output after the process has finished.
    pub fn take_stderr_output(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once, before playback starts.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, stopping...");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_programs() {
        assert_eq!(Tool::Ffmpeg.program(), "ffmpeg");
        assert_eq!(Tool::Ffplay.program(), "ffplay");
        assert_eq!(Tool::Ffprobe.program(), "ffprobe");
    }

    #[test]
    fn test_tool_not_found_display() {
        let msg = PipelineError::ToolNotFound(Tool::Ffplay).to_string();
        assert!(msg.contains("ffplay not found"));
        assert!(msg.contains("install FFmpeg"));
    }

    #[test]
    fn test_process_failed_error() {
        let err = PipelineError::ProcessFailed {
            tool: Tool::Ffmpeg,
            exit_code: Some(1),
            stderr: "Error message".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ffmpeg exited with code Some(1)"));
        assert!(msg.contains("Error message"));
    }

    #[test]
    fn test_spawn_ffmpeg_version() {
        if !is_tool_on_path(Tool::Ffmpeg) {
            return;
        }
        let mut pipeline = Pipeline::reader(Tool::Ffmpeg, &["-version".to_string()]).unwrap();
        let status = pipeline.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_finish_reports_failure() {
        if !is_tool_on_path(Tool::Ffmpeg) {
            return;
        }
        let pipeline =
            Pipeline::detached(Tool::Ffmpeg, &["-invalid_nonexistent_flag_xyz".to_string()])
                .unwrap();
        let result = pipeline.finish();
        assert!(matches!(
            result,
            Err(PipelineError::ProcessFailed {
                tool: Tool::Ffmpeg,
                ..
            })
        ));
    }
}
