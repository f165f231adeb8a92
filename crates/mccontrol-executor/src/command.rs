//! Remote shell command building.

use mccontrol_core::ControlError;
use thiserror::Error;

/// Console input descriptor of the container's primary process.
pub const CONSOLE_INPUT_PATH: &str = "/proc/1/fd/0";

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Command cannot be parsed: {0}")]
    InvalidCommand(String),
    #[error("Command is empty after parsing")]
    EmptyCommand,
    #[error("Failed to quote command: {0}")]
    QuoteError(#[from] shlex::QuoteError),
}

impl From<CommandBuildError> for ControlError {
    fn from(err: CommandBuildError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Flatten into the argument vector handed to the platform.
    #[must_use]
    pub fn into_argv(self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program);
        argv.extend(self.args);
        argv
    }
}

/// Builder for remote invocations.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base command line, split with shell rules.
    base: String,
    /// Arguments appended verbatim, without splitting.
    params: Option<Vec<String>>,
}

impl CommandBuilder {
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: None,
        }
    }

    #[must_use]
    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Split the base and append the parameters.
    ///
    /// # Errors
    /// Returns error if the base cannot be split or nothing remains.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidCommand(self.base.clone()))?;
        if let Some(params) = &self.params {
            parts.extend(params.iter().cloned());
        }
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }

    /// Shell invocation writing `command` into the primary process's console
    /// input, so the server reads it as if typed at its terminal.
    ///
    /// # Errors
    /// Returns error if the command cannot be quoted (e.g. contains NUL).
    pub fn console_input(command: &str) -> Result<CommandParts, CommandBuildError> {
        let quoted = shlex::try_quote(command)?;
        Self::new("sh -c")
            .params([format!("echo {quoted} > {CONSOLE_INPUT_PATH}")])
            .build()
    }

    /// Direct invocation of `command`, split with shell rules.
    ///
    /// # Errors
    /// Returns error if the command cannot be split or is empty.
    pub fn direct(command: &str) -> Result<CommandParts, CommandBuildError> {
        Self::new(command).build()
    }
}
