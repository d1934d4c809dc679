use thiserror::Error;

/// Broad category of a failure.
///
/// The category decides the process exit code and whether a caller may
/// reasonably retry. Configuration errors are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings, missing columns, calls made in the wrong stage.
    Config,
    /// Input data is unusable (no valid rows, no valid pairs).
    Data,
    /// A numeric routine could not produce a result.
    Compute,
    /// Filesystem or (de)serialization failure.
    Io,
}

impl ErrorKind {
    fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Config | ErrorKind::Io => 2,
            ErrorKind::Data => 3,
            ErrorKind::Compute => 4,
        }
    }
}

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    pub fn compute(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compute, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

/// Build an "X missing, Y available" message for column validation failures.
pub fn missing_columns_error(context: &str, missing: &[String], available: &[String]) -> AppError {
    AppError::config(format!(
        "{context}: missing required columns [{}]; available columns are [{}]",
        missing.join(", "),
        available.join(", "),
    ))
}
