use thiserror::Error;

use crate::detection::infrastructure::model_resolver::ModelResolveError;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("could not resolve model: {0}")]
    ModelResolve(#[from] ModelResolveError),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}
