use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

/// Fatal failures of a run. Nothing is retried: every variant ends the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid dataset file {}: {}", .path.display(), .reason)]
    Dataset { path: PathBuf, reason: String },

    #[error("unable to read or write the checkpoint: {0:?}")]
    Checkpoint(RecorderError),

    #[error("loss is not finite at epoch {epoch}, iteration {iteration}")]
    NonFiniteLoss { epoch: usize, iteration: usize },

    #[error("unable to read tensor data: {0}")]
    TensorData(String),

    #[error("unable to write image: {0}")]
    Image(#[from] image::ImageError),
}

impl From<RecorderError> for Error {
    fn from(err: RecorderError) -> Self {
        Self::Checkpoint(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
