use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the inference backend while producing tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unable to read transcript {path:?}: {reason}")]
    Transcript { path: PathBuf, reason: String },
}

/// Terminal error for a streaming session. Snapshots emitted before it stay
/// valid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("token source failed after {tokens} tokens: {source}")]
    Source {
        tokens: usize,
        #[source]
        source: SourceError,
    },
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no geometry found in mesh text")]
    Empty,
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("unable to write mesh file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a generation is already running")]
    AlreadyGenerating,
    #[error("nothing to continue, start a generation first")]
    NoPreviousPrompt,
}
