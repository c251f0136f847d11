use cmdflow_core::{CommandConfig, CommandError, ExecutionResult, ProcessSupervisor, validate};
use tracing::{debug, info};

/// Execution entry points over one configuration snapshot.
///
/// All three share the same algorithm (start supervisor, pipe input, wait
/// for exit plus drain, validate) and differ only in blocking style and in
/// whether the outcome is awaited at all.
pub struct CommandExecutor {
    config: CommandConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Run the command to completion and validate the outcome.
    ///
    /// Cancellation is checked again after the wait completes and takes
    /// precedence over validation: a run whose token fired is reported as
    /// [`CommandError::Cancelled`] even if the process happened to exit
    /// naturally at nearly the same moment.
    pub async fn execute(&self) -> Result<ExecutionResult, CommandError> {
        let token = self.config.cancellation.clone();
        let mut supervisor = ProcessSupervisor::start(&self.config)?;
        let input = self.config.input.clone().into_bytes();

        debug!(program = %self.config.program, "driving command to completion");
        let finished = tokio::select! {
            res = Self::drive(&mut supervisor, &input) => {
                res?;
                true
            }
            _ = token.cancelled() => false,
        };

        if !finished || token.is_cancelled() {
            supervisor.try_kill();
            // The forced death closes the pipes, so draining reaches its
            // natural end-of-data and the wait below unwinds cleanly.
            supervisor.wait_for_exit().await?;
            info!(program = %self.config.program, "execution cancelled");
            return Err(CommandError::Cancelled);
        }

        let result = supervisor.into_result();
        validate(
            result,
            self.config.validate_exit_code,
            self.config.validate_stderr,
        )
    }

    /// Blocking variant of [`execute`](Self::execute).
    ///
    /// Spins up a current-thread runtime for the duration of the run; must
    /// not be called from inside an async context.
    pub fn execute_blocking(&self) -> Result<ExecutionResult, CommandError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute())
    }

    /// Fire-and-forget: start the process, pipe the configured input, and
    /// return without waiting for exit or validating anything.
    ///
    /// Only launch and input-piping failures surface; the caller never
    /// inspects the outcome.
    pub async fn execute_detached(&self) -> Result<(), CommandError> {
        let mut supervisor = ProcessSupervisor::start(&self.config)?;
        let input = self.config.input.clone().into_bytes();
        supervisor.pipe_input(&input).await?;
        info!(program = %self.config.program, pid = supervisor.id().unwrap_or(0), "detached");
        Ok(())
    }

    async fn drive(supervisor: &mut ProcessSupervisor, input: &[u8]) -> std::io::Result<()> {
        supervisor.pipe_input(input).await?;
        supervisor.wait_for_exit().await
    }
}
