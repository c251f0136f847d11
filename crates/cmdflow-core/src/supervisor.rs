use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{CommandConfig, LineObserver};
use crate::error::CommandError;
use crate::result::ExecutionResult;
use crate::signal::CompletionSignal;

/// Owns and drives exactly one child process end-to-end.
///
/// Starting the supervisor spawns one drain task per output stream, so both
/// pipes are read continuously from the moment the process runs. OS pipe
/// buffers are bounded; a child that writes enough output before anyone
/// reads it would otherwise deadlock against `wait_for_exit`.
///
/// A supervisor is finished once three independent events have all occurred:
/// the process exited, stdout reached end-of-data, stderr reached
/// end-of-data. Each is tracked by its own [`CompletionSignal`] and they may
/// fire in any relative order.
pub struct ProcessSupervisor {
    child: Child,
    program: String,
    stdout_text: Arc<OnceLock<String>>,
    stderr_text: Arc<OnceLock<String>>,
    exited: Arc<CompletionSignal>,
    stdout_drained: Arc<CompletionSignal>,
    stderr_drained: Arc<CompletionSignal>,
    started_at: DateTime<Utc>,
    exited_at: Option<DateTime<Utc>>,
    exit_status: Option<ExitStatus>,
}

impl ProcessSupervisor {
    /// Configure full I/O redirection, spawn the process, and begin draining
    /// both output streams.
    ///
    /// The command is executed directly (argv-style, no shell) with the
    /// configured arguments, working directory, and additive environment
    /// overrides. Launch failures (bad path, permissions) are the only
    /// errors this surfaces.
    pub fn start(config: &CommandConfig) -> Result<Self, CommandError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &config.working_directory {
            command.current_dir(dir);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| CommandError::LaunchFailed {
            program: config.program.clone(),
            source,
        })?;
        let started_at = Utc::now();
        info!(
            program = %config.program,
            pid = child.id().unwrap_or(0),
            "child process started"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let supervisor = Self {
            child,
            program: config.program.clone(),
            stdout_text: Arc::new(OnceLock::new()),
            stderr_text: Arc::new(OnceLock::new()),
            exited: Arc::new(CompletionSignal::new()),
            stdout_drained: Arc::new(CompletionSignal::new()),
            stderr_drained: Arc::new(CompletionSignal::new()),
            started_at,
            exited_at: None,
            exit_status: None,
        };

        supervisor.attach_drain(
            stdout,
            "stdout",
            config.on_stdout_line.clone(),
            supervisor.stdout_text.clone(),
            supervisor.stdout_drained.clone(),
        );
        supervisor.attach_drain(
            stderr,
            "stderr",
            config.on_stderr_line.clone(),
            supervisor.stderr_text.clone(),
            supervisor.stderr_drained.clone(),
        );

        Ok(supervisor)
    }

    fn attach_drain<R>(
        &self,
        stream: Option<R>,
        label: &'static str,
        observer: Option<LineObserver>,
        slot: Arc<OnceLock<String>>,
        drained: Arc<CompletionSignal>,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let Some(stream) = stream else {
            let _ = slot.set(String::new());
            drained.release();
            return;
        };

        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut raw = Vec::new();
            let mut text = String::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    // EOF is the end-of-data marker, not content.
                    Ok(0) => break,
                    Ok(_) => {
                        if raw.last() == Some(&b'\n') {
                            raw.pop();
                            if raw.last() == Some(&b'\r') {
                                raw.pop();
                            }
                        }
                        let line = String::from_utf8_lossy(&raw);
                        text.push_str(&line);
                        text.push('\n');
                        if let Some(observer) = &observer {
                            observer(&line);
                        }
                    }
                    Err(err) => {
                        warn!(stream = label, error = %err, "stream read failed");
                        break;
                    }
                }
            }
            debug!(stream = label, bytes = text.len(), "stream drained");
            let _ = slot.set(text);
            drained.release();
        });
    }

    /// Copy `input` into the child's standard input, then close the pipe.
    ///
    /// Closing stdin is mandatory even for empty input: processes that read
    /// until end-of-input would otherwise never make progress. A second call
    /// is a no-op (the pipe is closed exactly once).
    ///
    /// A child is free to exit without consuming its input; the resulting
    /// broken pipe is treated as end-of-input, not an error.
    pub async fn pipe_input(&mut self, input: &[u8]) -> std::io::Result<()> {
        if let Some(mut stdin) = self.child.stdin.take() {
            let copy = async {
                if !input.is_empty() {
                    stdin.write_all(input).await?;
                }
                stdin.shutdown().await
            };
            match copy.await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(
                        program = %self.program,
                        "child closed stdin before end of input"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Suspend until the process has exited and both output streams are
    /// fully drained, in any arrival order.
    ///
    /// Once this returns, `exit_code`, `standard_output`, and
    /// `standard_error` are final. Idempotent: re-invocation returns as soon
    /// as the sticky signals are re-checked.
    pub async fn wait_for_exit(&mut self) -> std::io::Result<()> {
        if self.exit_status.is_none() {
            let status = self.child.wait().await?;
            self.exit_status = Some(status);
            self.exited_at = Some(Utc::now());
            self.exited.release();
            info!(
                program = %self.program,
                exit_code = status.code().unwrap_or(-1),
                "child process exited"
            );
        }
        self.stdout_drained.wait_async().await;
        self.stderr_drained.wait_async().await;
        Ok(())
    }

    /// Best-effort forceful termination.
    ///
    /// Termination races against natural exit, so failure here is expected
    /// and reported as `false` rather than an error.
    pub fn try_kill(&mut self) -> bool {
        match self.child.start_kill() {
            Ok(()) => {
                debug!(program = %self.program, "kill signal sent");
                true
            }
            Err(err) => {
                debug!(program = %self.program, error = %err, "kill failed, process likely exited");
                false
            }
        }
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit code; meaningful only after [`wait_for_exit`](Self::wait_for_exit)
    /// returned. Termination by signal reports `-1`.
    pub fn exit_code(&self) -> i32 {
        self.exit_status.and_then(|status| status.code()).unwrap_or(-1)
    }

    /// Captured stdout; final once the stdout drain signal is set.
    pub fn standard_output(&self) -> &str {
        self.stdout_text.get().map(String::as_str).unwrap_or("")
    }

    /// Captured stderr; final once the stderr drain signal is set.
    pub fn standard_error(&self) -> &str {
        self.stderr_text.get().map(String::as_str).unwrap_or("")
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn exited_at(&self) -> Option<DateTime<Utc>> {
        self.exited_at
    }

    pub fn exited_signal(&self) -> &CompletionSignal {
        &self.exited
    }

    pub fn stdout_drained_signal(&self) -> &CompletionSignal {
        &self.stdout_drained
    }

    pub fn stderr_drained_signal(&self) -> &CompletionSignal {
        &self.stderr_drained
    }

    /// Assemble the immutable outcome record. Call after
    /// [`wait_for_exit`](Self::wait_for_exit).
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            exit_code: self.exit_code(),
            standard_output: self.stdout_text.get().cloned().unwrap_or_default(),
            standard_error: self.stderr_text.get().cloned().unwrap_or_default(),
            started_at: self.started_at,
            exited_at: self.exited_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config(program: &str, args: &[&str]) -> CommandConfig {
        CommandConfig::builder()
            .program(program)
            .args(args.iter().copied())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn captures_stdout_of_a_clean_run() {
        let mut supervisor = ProcessSupervisor::start(&config("echo", &["hello"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();

        assert_eq!(supervisor.exit_code(), 0);
        assert_eq!(supervisor.standard_output(), "hello\n");
        assert_eq!(supervisor.standard_error(), "");
    }

    #[tokio::test]
    async fn captures_stderr_independently() {
        let mut supervisor =
            ProcessSupervisor::start(&config("sh", &["-c", "echo warn >&2"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();

        assert_eq!(supervisor.exit_code(), 0);
        assert_eq!(supervisor.standard_output(), "");
        assert_eq!(supervisor.standard_error(), "warn\n");
    }

    #[tokio::test]
    async fn reports_nonzero_exit_code_as_data() {
        let mut supervisor = ProcessSupervisor::start(&config("sh", &["-c", "exit 3"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();
        assert_eq!(supervisor.exit_code(), 3);
    }

    #[tokio::test]
    async fn pipes_input_bytes_in_order_and_closes_stdin() {
        let mut supervisor = ProcessSupervisor::start(&config("cat", &[])).unwrap();
        supervisor.pipe_input(b"alpha\nbeta\n").await.unwrap();
        // Second call must be a no-op, not a double close.
        supervisor.pipe_input(b"ignored\n").await.unwrap();
        supervisor.wait_for_exit().await.unwrap();
        assert_eq!(supervisor.standard_output(), "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn oversized_input_to_a_non_reading_child_is_end_of_input() {
        // The child exits without touching stdin; once the OS pipe buffer is
        // full the write sees a broken pipe, which must not surface as an
        // error. 1 MiB comfortably exceeds any default pipe buffer.
        let mut supervisor = ProcessSupervisor::start(&config("sh", &["-c", "exit 7"])).unwrap();
        let input = vec![b'x'; 1024 * 1024];
        supervisor.pipe_input(&input).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();
        assert_eq!(supervisor.exit_code(), 7);
    }

    #[tokio::test]
    async fn empty_input_still_closes_the_pipe() {
        // cat reads until end-of-input; without the close it would hang.
        let mut supervisor = ProcessSupervisor::start(&config("cat", &[])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_exit())
            .await
            .expect("cat should exit once stdin is closed")
            .unwrap();
        assert_eq!(supervisor.exit_code(), 0);
    }

    #[tokio::test]
    async fn preserves_line_order_per_stream() {
        let mut supervisor =
            ProcessSupervisor::start(&config("sh", &["-c", "printf '1\\n2\\n3\\n'"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();
        assert_eq!(supervisor.standard_output(), "1\n2\n3\n");
    }

    #[tokio::test]
    async fn line_observers_see_every_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let config = CommandConfig::builder()
            .program("sh")
            .args(["-c", "echo one; echo two"])
            .on_stdout_line({
                let seen = seen.clone();
                move |line| seen.lock().unwrap().push(line.to_string())
            })
            .build()
            .unwrap();

        let mut supervisor = ProcessSupervisor::start(&config).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn try_kill_terminates_a_long_running_process() {
        let mut supervisor = ProcessSupervisor::start(&config("sleep", &["30"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        assert!(supervisor.try_kill());
        tokio::time::timeout(Duration::from_secs(5), supervisor.wait_for_exit())
            .await
            .expect("killed process should exit promptly")
            .unwrap();
        assert_ne!(supervisor.exit_code(), 0);
    }

    #[tokio::test]
    async fn all_signals_set_and_sticky_after_wait() {
        let mut supervisor = ProcessSupervisor::start(&config("echo", &["done"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();

        assert!(supervisor.exited_signal().is_set());
        assert!(supervisor.stdout_drained_signal().is_set());
        assert!(supervisor.stderr_drained_signal().is_set());

        // Monotonic: re-waiting returns immediately.
        tokio::time::timeout(Duration::from_secs(1), supervisor.wait_for_exit())
            .await
            .expect("repeat wait must not block")
            .unwrap();
    }

    #[tokio::test]
    async fn records_start_and_exit_timestamps() {
        let mut supervisor = ProcessSupervisor::start(&config("echo", &["t"])).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();

        let result = supervisor.into_result();
        assert!(result.exited_at >= result.started_at);
    }

    #[tokio::test]
    async fn launch_failure_surfaces_from_start() {
        let err = ProcessSupervisor::start(&config("cmdflow-test-no-such-binary", &[]))
            .err()
            .expect("spawn of a missing binary must fail");
        match err {
            CommandError::LaunchFailed { program, .. } => {
                assert_eq!(program, "cmdflow-test-no-such-binary")
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn applies_env_and_working_directory() {
        let config = CommandConfig::builder()
            .program("sh")
            .args(["-c", "printf '%s' \"$CMDFLOW_TEST_VAR\"; pwd"])
            .env("CMDFLOW_TEST_VAR", "42")
            .working_directory("/")
            .build()
            .unwrap();

        let mut supervisor = ProcessSupervisor::start(&config).unwrap();
        supervisor.pipe_input(&[]).await.unwrap();
        supervisor.wait_for_exit().await.unwrap();
        assert_eq!(supervisor.standard_output(), "42/\n");
    }
}
