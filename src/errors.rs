use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::ClassId;

/// Error type for record-store reads, split sampling, and artifact writes.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("record stream not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("record stream '{}' is corrupt: {details}", path.display())]
    Corruption { path: PathBuf, details: String },
    #[error("dataset is unlabeled; {operation} requires class labels")]
    UnlabeledDataset { operation: &'static str },
    #[error("insufficient examples: {details}")]
    InsufficientExamples { details: String },
    #[error("failed to write '{}': {reason}", path.display())]
    Write { path: PathBuf, reason: String },
    #[error("invalid value for {parameter}: {reason}")]
    Value {
        parameter: &'static str,
        reason: String,
    },
    #[error("index {index} out of range for dataset of {len} examples")]
    Index { index: u64, len: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SplitError {
    pub(crate) fn corruption(path: &Path, details: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.to_path_buf(),
            details: details.into(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl ToString) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn value(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Value {
            parameter,
            reason: reason.into(),
        }
    }

    pub(crate) fn short_class(class: ClassId, quota: usize, available: usize) -> Self {
        Self::InsufficientExamples {
            details: format!(
                "class {class} needs {quota} examples but only {available} are available"
            ),
        }
    }

    /// Short stable name of the error kind, used in CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFoundError",
            Self::Corruption { .. } => "CorruptionError",
            Self::UnlabeledDataset { .. } => "UnlabeledDatasetError",
            Self::InsufficientExamples { .. } => "InsufficientExamplesError",
            Self::Write { .. } => "WriteError",
            Self::Value { .. } => "ValueError",
            Self::Index { .. } => "IndexError",
            Self::Io(_) => "IoError",
        }
    }

    /// Process exit code used by the bundled binaries; distinct per kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotFound { .. } => 2,
            Self::Corruption { .. } => 3,
            Self::UnlabeledDataset { .. } => 4,
            Self::InsufficientExamples { .. } => 5,
            Self::Write { .. } => 6,
            Self::Value { .. } => 7,
            Self::Index { .. } => 8,
            Self::Io(_) => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let errors = [
            SplitError::NotFound {
                path: PathBuf::from("a"),
            },
            SplitError::corruption(Path::new("a"), "bad magic"),
            SplitError::UnlabeledDataset {
                operation: "class_counts",
            },
            SplitError::short_class(3, 10, 2),
            SplitError::write(Path::new("out"), "disk full"),
            SplitError::value("size", "must be non-negative"),
            SplitError::Index { index: 9, len: 3 },
            SplitError::Io(io::Error::other("boom")),
        ];
        let mut codes: Vec<u8> = errors.iter().map(SplitError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code != 0));

        let mut kinds: Vec<&str> = errors.iter().map(SplitError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn messages_name_the_offending_parameter() {
        let err = SplitError::value("size", "-4 is negative");
        assert!(err.to_string().contains("size"));
        assert!(err.to_string().contains("-4"));

        let err = SplitError::short_class(7, 401, 400);
        assert!(matches!(err, SplitError::InsufficientExamples { .. }));
        assert!(err.to_string().contains("class 7"));
        assert!(err.to_string().contains("401"));
    }
}
