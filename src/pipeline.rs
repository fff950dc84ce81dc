use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::errors::SplitError;
use crate::projection::write_unlabeled_view;
use crate::registry::{DatasetRegistry, SplitKey};
use crate::sampler::{SplitRequest, sample_source};
use crate::source::{RecordSource, RecordStore};
use crate::splits::{SplitArtifact, SplitWriter};

/// Wires the stages together for one dataset: key, sample, write.
///
/// Artifacts land under `config.artifact_dir(key)`; the source is never
/// written to.
pub struct SplitPipeline<S = RecordStore> {
    config: PipelineConfig,
    registry: DatasetRegistry,
    source: S,
}

impl SplitPipeline<RecordStore> {
    /// Open the dataset's train stream from the configured layout.
    pub fn open(config: PipelineConfig) -> Result<Self, SplitError> {
        let source = RecordStore::open(config.train_path())?;
        Self::with_source(config, DatasetRegistry::default(), source)
    }
}

impl<S> SplitPipeline<S>
where
    S: RecordSource,
{
    pub fn with_source(
        config: PipelineConfig,
        registry: DatasetRegistry,
        source: S,
    ) -> Result<Self, SplitError> {
        let Some(expected_classes) = registry.classes(&config.dataset_name) else {
            return Err(SplitError::value(
                "dataset_name",
                format!("unknown dataset '{}'", config.dataset_name),
            ));
        };
        if source.is_labeled() {
            let classes = source.class_counts()?.len();
            if classes != expected_classes as usize {
                warn!(
                    dataset = %config.dataset_name,
                    expected = expected_classes,
                    found = classes,
                    "source class count differs from the registry"
                );
            }
        }
        Ok(Self {
            config,
            registry,
            source,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn key(&self, request: &SplitRequest) -> Result<SplitKey, SplitError> {
        self.registry.key(&self.config.dataset_name, request)
    }

    /// Sample and write one split.
    pub fn generate(&self, request: &SplitRequest) -> Result<SplitArtifact, SplitError> {
        let key = self.key(request)?;
        let destination = self.config.artifact_dir(&key);
        let result = sample_source(&self.source, request)?;
        SplitWriter::new()
            .with_key(key.to_string())
            .with_dataset(self.config.dataset_name.clone())
            .write(&self.source, &result, destination)
    }

    /// Generate independent splits in parallel.
    ///
    /// Requests mapping to the same key are rejected up front. Results keep
    /// the order of `requests`; the first failure is returned.
    pub fn generate_all(&self, requests: &[SplitRequest]) -> Result<Vec<SplitArtifact>, SplitError> {
        let mut keys = BTreeSet::new();
        for request in requests {
            let key = self.key(request)?;
            if !keys.insert(key.to_string()) {
                return Err(SplitError::value(
                    "requests",
                    format!("split '{key}' was requested more than once"),
                ));
            }
        }
        info!(
            dataset = %self.config.dataset_name,
            splits = requests.len(),
            "generating splits"
        );
        requests
            .par_iter()
            .map(|request| self.generate(request))
            .collect()
    }

    /// Write the label-stripped view of the source to the configured path.
    pub fn write_unlabeled(&self) -> Result<RecordStore, SplitError> {
        write_unlabeled_view(&self.source, self.config.unlabeled_path())
    }
}
