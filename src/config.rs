use std::path::{Path, PathBuf};

use crate::constants::layout::{
    DEFAULT_DATA_ROOT, DEFAULT_NAMESPACE, TRAIN_SUBSET, UNLABELED_SUBSET,
};
use crate::constants::record_stream::STREAM_EXTENSION;
use crate::registry::SplitKey;
use crate::types::DatasetName;

/// Where a pipeline reads sources and writes split artifacts.
///
/// Values are passed explicitly; the library never consults the process
/// environment to fill them in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Root directory holding record streams and the artifact namespace.
    pub data_root: PathBuf,
    /// Subdirectory of `data_root` that holds split artifacts.
    pub project_namespace: String,
    /// Dataset the pipeline operates on.
    pub dataset_name: DatasetName,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            project_namespace: DEFAULT_NAMESPACE.to_string(),
            dataset_name: String::new(),
        }
    }
}

impl PipelineConfig {
    pub fn new(data_root: impl Into<PathBuf>, dataset_name: impl Into<DatasetName>) -> Self {
        Self {
            data_root: data_root.into(),
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.project_namespace = namespace.into();
        self
    }

    /// `<data_root>/<dataset>-train.sslr`
    pub fn train_path(&self) -> PathBuf {
        self.subset_path(TRAIN_SUBSET)
    }

    /// `<data_root>/<dataset>-unlabeled.sslr`
    pub fn unlabeled_path(&self) -> PathBuf {
        self.subset_path(UNLABELED_SUBSET)
    }

    pub fn namespace_dir(&self) -> PathBuf {
        self.data_root.join(&self.project_namespace)
    }

    /// `<data_root>/<namespace>/<key>/`
    pub fn artifact_dir(&self, key: &SplitKey) -> PathBuf {
        self.namespace_dir().join(key.to_string())
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    fn subset_path(&self, subset: &str) -> PathBuf {
        self.data_root
            .join(format!("{}-{subset}.{STREAM_EXTENSION}", self.dataset_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_uses_data_root_and_namespace() {
        let config = PipelineConfig {
            dataset_name: "cifar10".into(),
            ..PipelineConfig::default()
        };
        assert_eq!(config.train_path(), Path::new("data/cifar10-train.sslr"));
        assert_eq!(
            config.unlabeled_path(),
            Path::new("data/cifar10-unlabeled.sslr")
        );
        let key = SplitKey {
            dataset: "cifar10".into(),
            seed: 3,
            size: 250,
            class_balanced: true,
        };
        assert_eq!(
            config.artifact_dir(&key),
            Path::new("data/SSL/cifar10.3@250-balanced")
        );
    }

    #[test]
    fn namespace_can_be_overridden() {
        let config = PipelineConfig::new("/tmp/ml", "svhn").with_namespace("experiments");
        assert_eq!(config.namespace_dir(), Path::new("/tmp/ml/experiments"));
        assert_eq!(config.data_root(), Path::new("/tmp/ml"));
    }
}
