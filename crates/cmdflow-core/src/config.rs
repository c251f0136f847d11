use derive_builder::Builder;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use tokio_util::sync::CancellationToken;

/// Observer invoked once per line received on an output stream.
///
/// A side notification only; the full text is still accumulated and returned
/// in the execution result.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Source of the bytes piped into the child's standard input.
///
/// The pipe is always closed after the copy, so the default empty source
/// simply closes it right away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputSource {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl InputSource {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            InputSource::Empty => Vec::new(),
            InputSource::Text(text) => text.into_bytes(),
            InputSource::Bytes(bytes) => bytes,
        }
    }

}

impl From<&str> for InputSource {
    fn from(text: &str) -> Self {
        InputSource::Text(text.to_string())
    }
}

impl From<String> for InputSource {
    fn from(text: String) -> Self {
        InputSource::Text(text)
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

/// Immutable snapshot of everything one execution needs.
///
/// Built once through [`CommandConfigBuilder`] and consumed read-only by the
/// supervisor at start time. Arguments are argv-style (no shell is involved)
/// and environment overrides are applied additively on top of the inherited
/// environment.
#[derive(Clone, Builder)]
#[builder(setter(into, strip_option), build_fn(validate = "Self::validate"))]
pub struct CommandConfig {
    /// Path of the executable to launch. Required, must be non-empty.
    pub program: String,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    #[builder(default)]
    pub input: InputSource,
    #[builder(default)]
    #[builder(setter(custom))]
    pub on_stdout_line: Option<LineObserver>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub on_stderr_line: Option<LineObserver>,
    /// Caller-supplied cancellation handle; the default token never fires.
    #[builder(default)]
    pub cancellation: CancellationToken,
    /// Treat a non-zero exit code as a failure.
    #[builder(default = "true")]
    pub validate_exit_code: bool,
    /// Treat non-blank standard-error content as a failure.
    #[builder(default)]
    pub validate_stderr: bool,
}

impl CommandConfig {
    pub fn builder() -> CommandConfigBuilder {
        CommandConfigBuilder::default()
    }
}

impl CommandConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn on_stdout_line(&mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> &mut Self {
        self.on_stdout_line = Some(Some(Arc::new(observer)));
        self
    }

    pub fn on_stderr_line(&mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> &mut Self {
        self.on_stderr_line = Some(Some(Arc::new(observer)));
        self
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(program) = &self.program {
            if program.trim().is_empty() {
                return Err("program must not be empty".to_string());
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("working_directory", &self.working_directory)
            .field("input", &self.input)
            .field("validate_exit_code", &self.validate_exit_code)
            .field("validate_stderr", &self.validate_stderr)
            .finish_non_exhaustive()
    }
}
