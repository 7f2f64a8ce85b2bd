use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Bootstrap step '{step}' failed: {message}")]
    BootstrapError { step: String, message: String },

    #[error("Command `{command}` exited with status {code}")]
    ProcessFailed { command: String, code: i32 },

    #[error("Server error: {message}")]
    ServerError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Io,
    Data,
    Configuration,
    Bootstrap,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code used by the CLI for this severity.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl PulseError {
    pub fn config(message: impl Into<String>) -> Self {
        PulseError::ConfigError {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        PulseError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn bootstrap(step: impl Into<String>, message: impl Into<String>) -> Self {
        PulseError::BootstrapError {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PulseError::ApiError(_) => ErrorCategory::Network,
            PulseError::IoError(_) => ErrorCategory::Io,
            PulseError::CsvError(_)
            | PulseError::SerializationError(_)
            | PulseError::ProcessingError { .. } => ErrorCategory::Data,
            PulseError::ConfigError { .. }
            | PulseError::MissingConfigError { .. }
            | PulseError::InvalidConfigValueError { .. }
            | PulseError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            PulseError::BootstrapError { .. } | PulseError::ProcessFailed { .. } => {
                ErrorCategory::Bootstrap
            }
            PulseError::ServerError { .. } => ErrorCategory::Server,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Configuration | ErrorCategory::Bootstrap => {
                ErrorSeverity::High
            }
            ErrorCategory::Io | ErrorCategory::Server => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            PulseError::ApiError(_) => {
                "Check network connectivity and the API credentials in your environment".to_string()
            }
            PulseError::IoError(_) => "Check that the path exists and is writable".to_string(),
            PulseError::CsvError(_) | PulseError::SerializationError(_) => {
                "The input data is malformed; regenerate it with `leadpulse collect`".to_string()
            }
            PulseError::ConfigError { .. }
            | PulseError::ConfigValidationError { .. }
            | PulseError::InvalidConfigValueError { .. } => {
                "Fix the value in your TOML config file or the matching environment variable"
                    .to_string()
            }
            PulseError::MissingConfigError { field } => {
                format!("Set `{}` in the config file or environment", field)
            }
            PulseError::ProcessingError { .. } => {
                "Re-run with --verbose to see which record failed".to_string()
            }
            PulseError::BootstrapError { step, .. } => match step.as_str() {
                "project_dir" => "Create the project directory or point --project-dir at it".to_string(),
                "manifest" => "Add the dependency manifest to the project directory".to_string(),
                "env_file" => "Fix the offending line in the .env file".to_string(),
                _ => "Re-run with --verbose for details".to_string(),
            },
            PulseError::ProcessFailed { command, .. } => {
                format!("Run `{}` by hand to see its full output", command)
            }
            PulseError::ServerError { .. } => {
                "Check that the port is free and the host address is valid".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach an upstream service: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
            ErrorCategory::Data => format!("Could not process data: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Bootstrap => format!("Startup failed: {}", self),
            ErrorCategory::Server => format!("Server failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_errors_exit_with_failure() {
        let err = PulseError::bootstrap("manifest", "requirements.txt not found");
        assert_eq!(err.category(), ErrorCategory::Bootstrap);
        assert_eq!(err.severity().exit_code(), 1);
        assert!(err.recovery_suggestion().contains("manifest"));
    }

    #[test]
    fn test_process_failure_message_names_command() {
        let err = PulseError::ProcessFailed {
            command: "pip install -q -r requirements.txt".to_string(),
            code: 1,
        };
        assert!(err.to_string().contains("pip install"));
        assert!(err.user_friendly_message().starts_with("Startup failed"));
    }

    #[test]
    fn test_io_errors_are_critical() {
        let err = PulseError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().exit_code(), 3);
    }
}
