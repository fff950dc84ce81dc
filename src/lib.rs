#![doc = include_str!("../README.md")]

/// Command-line runners behind the bundled binaries.
pub mod cli;
/// Pipeline configuration and on-disk layout.
pub mod config;
/// Centralized constants for streams, sampling, artifacts, and layout.
pub mod constants;
/// Example and class index types.
pub mod data;
mod errors;
mod hash;
/// Class-folder dataset import.
pub mod ingestion;
/// Class balance metrics.
pub mod metrics;
/// End-to-end split generation over a configured dataset.
pub mod pipeline;
/// Label-stripped dataset views.
pub mod projection;
/// Dataset registry and split keys.
pub mod registry;
/// Deterministic index sampling.
pub mod sampler;
/// Record sources and the framed record stream format.
pub mod source;
/// Split artifacts: writer, manifest, and reopen/verify.
pub mod splits;
/// Filesystem walking and staged atomic output.
pub mod transport;
/// Shared type aliases.
pub mod types;

pub use config::PipelineConfig;
pub use data::{ClassCounts, ClassIndex, Example};
pub use errors::SplitError;
pub use hash::{fnv1a64, index_fingerprint};
pub use ingestion::{ImportOptions, ImportOutcome, import_class_folders};
pub use pipeline::SplitPipeline;
pub use projection::write_unlabeled_view;
pub use registry::{DatasetRegistry, SplitKey, key_for};
pub use sampler::{Population, SplitRequest, SplitResult, sample, sample_source};
pub use source::{InMemorySource, RecordSource, RecordStore, RecordStreamWriter};
pub use splits::{SplitArtifact, SplitManifest, SplitWriter};
pub use types::{ClassId, DatasetName, ExampleIndex, Fingerprint, SplitKeyString};
