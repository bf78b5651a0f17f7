//! Error types for the program harness

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Unknown program: {0:?}")]
    UnknownProgram(String),

    #[error("Input load error in {path:?}: {reason}")]
    InputLoad {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Output write error in {path:?}: {reason}")]
    OutputWrite {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Use after dispose: {operation}() called on a disposed handle")]
    UseAfterDispose { operation: &'static str },

    #[error("Program {program:?} failed to compile: {reason}")]
    Compile { program: String, reason: String },

    #[error("Unknown relation {relation:?} in program {program:?}")]
    UnknownRelation { program: String, relation: String },

    #[error("Relation {0:?} is not an input relation")]
    NotAnInput(String),

    #[error("Invalid tuple for {relation:?}: {reason}")]
    InvalidTuple { relation: String, reason: String },
}

impl HarnessError {
    /// Process exit status for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::UnknownProgram(_) => 2,
            HarnessError::InputLoad { .. } => 3,
            HarnessError::Evaluation(_) => 4,
            HarnessError::OutputWrite { .. } => 5,
            HarnessError::UseAfterDispose { .. } => 6,
            HarnessError::Compile { .. } => 7,
            HarnessError::UnknownRelation { .. }
            | HarnessError::NotAnInput(_)
            | HarnessError::InvalidTuple { .. } => 8,
        }
    }

    /// Malformed input without an underlying I/O failure
    pub fn input_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HarnessError::InputLoad {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn input_io(path: impl Into<PathBuf>, reason: impl Into<String>, err: io::Error) -> Self {
        HarnessError::InputLoad {
            path: path.into(),
            reason: format!("{}: {}", reason.into(), err),
            source: Some(err),
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HarnessError::OutputWrite {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn output_io(path: impl Into<PathBuf>, reason: impl Into<String>, err: io::Error) -> Self {
        HarnessError::OutputWrite {
            path: path.into(),
            reason: format!("{}: {}", reason.into(), err),
            source: Some(err),
        }
    }
}
