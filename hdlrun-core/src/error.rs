use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced to the user by [`crate::RunController`].
///
/// None of these leave the controller in a broken state; the run state is
/// always `Idle` after an error is returned.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Already running!")]
    AlreadyRunning,

    #[error("No supported file found or selected.")]
    NoTarget,

    #[error("Failed to open {}: {message}", path.display())]
    OpenFailed { path: PathBuf, message: String },

    #[error("Failed to list {}: {message}", path.display())]
    ListFailed { path: PathBuf, message: String },
}
