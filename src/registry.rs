use std::collections::BTreeMap;
use std::fmt;

use crate::constants::registry::{DEFAULT_DATASETS, MODE_BALANCED, MODE_UNIFORM};
use crate::errors::SplitError;
use crate::sampler::SplitRequest;
use crate::types::{DatasetName, SplitKeyString};

/// Known dataset names and their class counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetRegistry {
    datasets: BTreeMap<DatasetName, u32>,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self {
            datasets: DEFAULT_DATASETS
                .iter()
                .map(|(name, classes)| (name.to_string(), *classes))
                .collect(),
        }
    }
}

impl DatasetRegistry {
    /// Registry without any datasets.
    pub fn empty() -> Self {
        Self {
            datasets: BTreeMap::new(),
        }
    }

    /// Add or update a dataset. Names are lowercase ascii alphanumerics and `_`.
    pub fn register(&mut self, name: &str, classes: u32) -> Result<(), SplitError> {
        validate_name(name)?;
        if classes == 0 {
            return Err(SplitError::value(
                "classes",
                format!("dataset '{name}' must have at least one class"),
            ));
        }
        self.datasets.insert(name.to_string(), classes);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn classes(&self, name: &str) -> Option<u32> {
        self.datasets.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Build the key for `request` against `dataset_name`.
    pub fn key(&self, dataset_name: &str, request: &SplitRequest) -> Result<SplitKey, SplitError> {
        if !self.contains(dataset_name) {
            return Err(SplitError::value(
                "dataset_name",
                format!("unknown dataset '{dataset_name}'"),
            ));
        }
        Ok(SplitKey {
            dataset: dataset_name.to_string(),
            seed: request.seed,
            size: request.size,
            class_balanced: request.class_balanced,
        })
    }

    /// String form of [`DatasetRegistry::key`] with a signed size.
    pub fn key_for(
        &self,
        seed: u64,
        size: i64,
        dataset_name: &str,
        class_balanced: bool,
    ) -> Result<SplitKeyString, SplitError> {
        let request = SplitRequest::try_new(seed, size, class_balanced)?;
        Ok(self.key(dataset_name, &request)?.to_string())
    }
}

/// Stable identifier of a split: `"{dataset}.{seed}@{size}-{mode}"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplitKey {
    pub dataset: DatasetName,
    pub seed: u64,
    pub size: u64,
    pub class_balanced: bool,
}

impl SplitKey {
    pub fn request(&self) -> SplitRequest {
        SplitRequest::new(self.seed, self.size, self.class_balanced)
    }

    /// Parse a key string. The dataset is not checked against any registry.
    pub fn parse(key: &str) -> Result<Self, SplitError> {
        let invalid = || SplitError::value("key", format!("'{key}' is not a split key"));
        let (dataset, rest) = key.rsplit_once('.').ok_or_else(invalid)?;
        let (seed, rest) = rest.split_once('@').ok_or_else(invalid)?;
        let (size, mode) = rest.split_once('-').ok_or_else(invalid)?;
        validate_name(dataset).map_err(|_| invalid())?;
        let class_balanced = match mode {
            MODE_BALANCED => true,
            MODE_UNIFORM => false,
            _ => return Err(invalid()),
        };
        let parse_number = |text: &str| {
            if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(invalid());
            }
            text.parse::<u64>().map_err(|_| invalid())
        };
        Ok(Self {
            dataset: dataset.to_string(),
            seed: parse_number(seed)?,
            size: parse_number(size)?,
            class_balanced,
        })
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.class_balanced {
            MODE_BALANCED
        } else {
            MODE_UNIFORM
        };
        write!(f, "{}.{}@{}-{}", self.dataset, self.seed, self.size, mode)
    }
}

/// Key for `(seed, size, dataset_name, class_balanced)` under the default registry.
///
/// ```
/// use ssl_splits::registry::key_for;
///
/// assert_eq!(key_for(3, 250, "cifar10", true).unwrap(), "cifar10.3@250-balanced");
/// assert!(key_for(3, -1, "cifar10", true).is_err());
/// ```
pub fn key_for(
    seed: u64,
    size: i64,
    dataset_name: &str,
    class_balanced: bool,
) -> Result<SplitKeyString, SplitError> {
    DatasetRegistry::default().key_for(seed, size, dataset_name, class_balanced)
}

fn validate_name(name: &str) -> Result<(), SplitError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(SplitError::value(
            "dataset_name",
            format!("'{name}' must be lowercase ascii alphanumerics or '_'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinguish_every_parameter() {
        let base = key_for(3, 250, "cifar10", true).unwrap();
        assert_eq!(base, "cifar10.3@250-balanced");
        assert_eq!(key_for(3, 250, "cifar10", true).unwrap(), base);

        let variants = [
            key_for(4, 250, "cifar10", true).unwrap(),
            key_for(3, 251, "cifar10", true).unwrap(),
            key_for(3, 250, "svhn", true).unwrap(),
            key_for(3, 250, "cifar10", false).unwrap(),
        ];
        for variant in &variants {
            assert_ne!(variant, &base);
        }
        assert_eq!(variants[3], "cifar10.3@250-uniform");
    }

    #[test]
    fn key_for_rejects_negative_sizes_and_unknown_datasets() {
        assert!(matches!(
            key_for(1, -5, "cifar10", true),
            Err(SplitError::Value { parameter: "size", .. })
        ));
        assert!(matches!(
            key_for(1, 5, "imagenet", true),
            Err(SplitError::Value { parameter: "dataset_name", .. })
        ));
    }

    #[test]
    fn registry_accepts_new_datasets() {
        let mut registry = DatasetRegistry::default();
        assert_eq!(registry.classes("voets"), Some(2));
        registry.register("tiny_imagenet", 200).unwrap();
        assert_eq!(
            registry.key_for(0, 0, "tiny_imagenet", false).unwrap(),
            "tiny_imagenet.0@0-uniform"
        );
        assert!(registry.register("Bad-Name", 2).is_err());
        assert!(registry.register("ok", 0).is_err());
        assert!(DatasetRegistry::empty().names().next().is_none());
    }

    #[test]
    fn parse_reverses_display() {
        let key = SplitKey::parse("svhn_noextra.18446744073709551615@1000-uniform").unwrap();
        assert_eq!(key.dataset, "svhn_noextra");
        assert_eq!(key.seed, u64::MAX);
        assert_eq!(key.size, 1000);
        assert!(!key.class_balanced);
        assert_eq!(key.to_string(), "svhn_noextra.18446744073709551615@1000-uniform");
        assert_eq!(key.request(), SplitRequest::new(u64::MAX, 1000, false));

        for bad in [
            "cifar10.3@250",
            "cifar10.3@-1-balanced",
            "cifar10.x@2-balanced",
            "cifar10.3@2-random",
            ".3@2-balanced",
            "Cifar.3@2-balanced",
        ] {
            assert!(SplitKey::parse(bad).is_err(), "{bad} should not parse");
        }
    }
}
