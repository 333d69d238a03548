use std::fmt;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, DqnError>;

/// Main error type for the DQN trainer
#[derive(Debug, Clone)]
pub enum DqnError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Numerical computation errors
    NumericalError(String),

    /// Empty buffer or container
    EmptyBuffer(String),

    /// Invalid action
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// The environment refused or failed a reset/step
    Environment(String),

    /// Training error
    TrainingError(String),
}

impl fmt::Display for DqnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DqnError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            DqnError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            DqnError::IoError(msg) => write!(f, "IO error: {}", msg),
            DqnError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            DqnError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            DqnError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            DqnError::InvalidAction { action, max_actions } => {
                write!(f, "Invalid action {}: must be less than {}", action, max_actions)
            }
            DqnError::Environment(msg) => write!(f, "Environment error: {}", msg),
            DqnError::TrainingError(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for DqnError {}

impl From<std::io::Error> for DqnError {
    fn from(err: std::io::Error) -> Self {
        DqnError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for DqnError {
    fn from(err: bincode::Error) -> Self {
        DqnError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for DqnError {
    fn from(err: serde_json::Error) -> Self {
        DqnError::SerializationError(err.to_string())
    }
}

impl DqnError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        DqnError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        DqnError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the message with the stage that failed, keeping the variant.
    ///
    /// The trainer uses this to report which part of a step went wrong
    /// ("environment step failed at step 1200: ...").
    pub fn context<S: AsRef<str>>(self, stage: S) -> Self {
        let stage = stage.as_ref();
        match self {
            DqnError::Environment(msg) => DqnError::Environment(format!("{}: {}", stage, msg)),
            DqnError::TrainingError(msg) => DqnError::TrainingError(format!("{}: {}", stage, msg)),
            DqnError::NumericalError(msg) => DqnError::NumericalError(format!("{}: {}", stage, msg)),
            DqnError::IoError(msg) => DqnError::IoError(format!("{}: {}", stage, msg)),
            DqnError::SerializationError(msg) => {
                DqnError::SerializationError(format!("{}: {}", stage, msg))
            }
            DqnError::EmptyBuffer(msg) => DqnError::EmptyBuffer(format!("{}: {}", stage, msg)),
            DqnError::DimensionMismatch { expected, actual } => DqnError::DimensionMismatch {
                expected: format!("{} ({})", expected, stage),
                actual,
            },
            other => DqnError::TrainingError(format!("{}: {}", stage, other)),
        }
    }
}
