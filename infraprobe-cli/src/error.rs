//! CLI-specific error types and exit code mapping

use infraprobe_core::error::InfraprobeError;
use infraprobe_workflow::WorkflowError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps each failure class to a stable process
/// exit code so CI jobs can tell a failed check from a leaked stack.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from infraprobe-core.
    #[error("{0}")]
    Core(#[from] InfraprobeError),

    /// Workflow failure, carrying the phase it originated in.
    #[error("{phase} phase: {0}", phase = .0.phase())]
    Workflow(#[from] WorkflowError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | Apply / backend failure                   |
    /// | 2    | Configuration error                       |
    /// | 3    | One or more verification checks failed    |
    /// | 4    | Teardown failed (resources may be leaked) |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Core(InfraprobeError::Config(_)) => 2,
            Self::Core(InfraprobeError::Io(_)) => 10,
            Self::Workflow(e) => match e {
                WorkflowError::Config { .. } => 2,
                WorkflowError::AssertionFailed { .. } => 3,
                WorkflowError::Destroy { .. } => 4,
                _ => 1,
            },
            Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}
