use crate::IntegrityViolation;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the ferry-workflow crate.
///
/// Every variant is terminal for the `convert` call that raised it.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("a target environment path is required for conversion")]
    MissingTargetPath,
    #[error("interpreter executable not found: {0}")]
    InterpreterNotFound(String),
    #[error("installation directory not found: {}", .0.display())]
    InstallDirNotFound(PathBuf),
    #[error("converter module missing: {}", .0.display())]
    DriverProgramMissing(PathBuf),
    #[error("external conversion failed with exit code {exit_code}: {output}")]
    ChildProcessFailed { exit_code: i32, output: String },
    #[error("external conversion timed out after {timeout_ms} ms: {output}")]
    ChildProcessTimedOut { timeout_ms: u128, output: String },
    #[error("external converter did not produce an output file: {}", .0.display())]
    OutputFileMissing(PathBuf),
    #[error("external converter could not produce a valid workflow")]
    NoConversionResult,
    #[error(transparent)]
    IntegrityViolation(#[from] IntegrityError),
    #[error("malformed graph: {0}")]
    MalformedGraph(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ConvertError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "converted workflow lost literal inputs for nodes: {}. Check installed extensions and conversion logs",
    describe_violations(.violations)
)]
pub struct IntegrityError {
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityError {
    pub fn new(violations: Vec<IntegrityViolation>) -> Self {
        Self { violations }
    }
}

fn describe_violations(violations: &[IntegrityViolation]) -> String {
    violations
        .iter()
        .map(|violation| {
            format!(
                "{} (id {}, {} literal value(s) expected)",
                violation.operation_type, violation.node_id, violation.expected_literal_count
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
