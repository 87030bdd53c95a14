//! Error handling for managed job directories.

use thiserror::Error;

/// Result type for job directory operations.
pub type JobDirResult<T> = Result<T, JobDirError>;

/// Errors that can occur while managing jobs and talking to the queue.
#[derive(Error, Debug)]
pub enum JobDirError {
    /// Job not found in the registry.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Refused to delete a directory that this registry does not own.
    #[error("Directory not registered, refusing to delete: {0}")]
    NotRegistered(String),

    /// A command template referenced a placeholder the job does not provide.
    #[error("Missing placeholder `{key}` for job {job}")]
    MissingPlaceholder { job: String, key: String },

    /// SLURM submission failed.
    #[error("SLURM submission failed: {0}")]
    SlurmSubmitError(String),

    /// SLURM command execution failed.
    #[error("SLURM command failed: {command} - {message}")]
    SlurmCommandError { command: String, message: String },

    /// Registry snapshot is malformed.
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
