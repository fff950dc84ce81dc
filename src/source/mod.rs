//! Record source interfaces.
//!
//! Ownership model:
//! - `RecordSource` is the read-only, index-addressed view every stage consumes.
//! - `RecordStore` is the file-backed implementation over a framed record stream.
//! - `InMemorySource` backs tests and small, programmatically built datasets.
//!
//! Implementations hold no shared mutable cursor state; sequential readers own
//! their cursor (see `RecordStore::cursor`).

use std::path::Path;
use std::sync::Arc;

use crate::data::{ClassCounts, ClassId, ClassIndex, Example, ExampleIndex};
use crate::errors::SplitError;

/// Framed on-disk record streams.
pub mod record_stream;

pub use record_stream::{RecordCursor, RecordStore, RecordStreamWriter};

/// Read-only, index-addressed dataset interface.
///
/// `len` must be stable for the lifetime of the value and `get(i)` must return
/// the same example for the same index on every call.
pub trait RecordSource: Send + Sync {
    /// Total number of examples `N`.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every example carries a class label.
    fn is_labeled(&self) -> bool;

    /// Backing file, when there is one.
    fn location(&self) -> Option<&Path> {
        None
    }

    /// Example at `index`; `SplitError::Index` outside `[0, N)`.
    fn get(&self, index: ExampleIndex) -> Result<Example, SplitError>;

    /// Label at `index` without materializing the payload.
    fn label_at(&self, index: ExampleIndex) -> Result<Option<ClassId>, SplitError> {
        self.get(index).map(|example| example.label)
    }

    /// Ascending global indices grouped by class.
    fn class_indices(&self) -> Result<ClassIndex, SplitError> {
        if !self.is_labeled() {
            return Err(SplitError::UnlabeledDataset {
                operation: "class_indices",
            });
        }
        let mut index = ClassIndex::new();
        for position in 0..self.len() {
            let label = self
                .label_at(position)?
                .ok_or(SplitError::UnlabeledDataset {
                    operation: "class_indices",
                })?;
            index.entry(label).or_default().push(position);
        }
        Ok(index)
    }

    /// Example count per class; sums to `len()`.
    fn class_counts(&self) -> Result<ClassCounts, SplitError> {
        if !self.is_labeled() {
            return Err(SplitError::UnlabeledDataset {
                operation: "class_counts",
            });
        }
        Ok(self
            .class_indices()?
            .into_iter()
            .map(|(class, indices)| (class, indices.len() as u64))
            .collect())
    }

    /// Visit `indices` in the order given.
    ///
    /// File-backed sources override this to stream through one owned handle.
    fn visit(
        &self,
        indices: &[ExampleIndex],
        visitor: &mut dyn FnMut(ExampleIndex, Example) -> Result<(), SplitError>,
    ) -> Result<(), SplitError> {
        for &index in indices {
            visitor(index, self.get(index)?)?;
        }
        Ok(())
    }
}

/// In-memory record source for tests and small datasets.
#[derive(Clone, Debug)]
pub struct InMemorySource {
    examples: Arc<Vec<Example>>,
    labeled: bool,
}

impl InMemorySource {
    /// Build a source from prebuilt examples.
    ///
    /// Either every example carries a label or none does; mixed input is rejected.
    /// An empty input is unlabeled; use [`InMemorySource::from_labels`] with an
    /// empty slice for an empty labeled source.
    pub fn new(examples: Vec<Example>) -> Result<Self, SplitError> {
        let with_labels = examples
            .iter()
            .filter(|example| example.label.is_some())
            .count();
        if with_labels != 0 && with_labels != examples.len() {
            return Err(SplitError::value(
                "examples",
                format!(
                    "{with_labels} of {} examples carry labels; expected all or none",
                    examples.len()
                ),
            ));
        }
        let labeled = !examples.is_empty() && with_labels == examples.len();
        Ok(Self {
            examples: Arc::new(examples),
            labeled,
        })
    }

    /// Labeled source where example `i` has payload `i` (LE bytes) and label `labels[i]`.
    pub fn from_labels(labels: &[ClassId]) -> Self {
        let examples = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| Example::labeled((idx as u64).to_le_bytes().to_vec(), *label))
            .collect();
        Self {
            examples: Arc::new(examples),
            labeled: true,
        }
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }
}

impl RecordSource for InMemorySource {
    fn len(&self) -> u64 {
        self.examples.len() as u64
    }

    fn is_labeled(&self) -> bool {
        self.labeled
    }

    fn get(&self, index: ExampleIndex) -> Result<Example, SplitError> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.examples.get(idx))
            .cloned()
            .ok_or(SplitError::Index {
                index,
                len: self.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_unlabeled() {
        let empty = InMemorySource::new(Vec::new()).unwrap();
        assert_eq!(empty.len(), 0);
        assert!(!empty.is_labeled());
        assert!(matches!(
            empty.class_indices(),
            Err(SplitError::UnlabeledDataset { .. })
        ));

        let labeled = InMemorySource::from_labels(&[]);
        assert!(labeled.is_labeled());
        assert!(labeled.class_indices().unwrap().is_empty());
    }

    #[test]
    fn in_memory_source_groups_indices_by_class() {
        let source = InMemorySource::from_labels(&[2, 0, 2, 1, 0]);
        let index = source.class_indices().unwrap();
        assert_eq!(index.get(&0), Some(&vec![1, 4]));
        assert_eq!(index.get(&1), Some(&vec![3]));
        assert_eq!(index.get(&2), Some(&vec![0, 2]));

        let counts = source.class_counts().unwrap();
        assert_eq!(counts.values().sum::<u64>(), source.len());
        assert_eq!(counts.get(&2), Some(&2));
    }

    #[test]
    fn in_memory_source_rejects_out_of_range_and_mixed_labels() {
        let source = InMemorySource::from_labels(&[0, 1]);
        assert!(matches!(
            source.get(2),
            Err(SplitError::Index { index: 2, len: 2 })
        ));

        let mixed = vec![Example::labeled(vec![1], 0), Example::unlabeled(vec![2])];
        assert!(matches!(
            InMemorySource::new(mixed),
            Err(SplitError::Value { .. })
        ));
    }

    #[test]
    fn unlabeled_source_refuses_label_operations() {
        let source =
            InMemorySource::new(vec![Example::unlabeled(vec![1]), Example::unlabeled(vec![2])])
                .unwrap();
        assert!(!source.is_labeled());
        assert!(matches!(
            source.class_counts(),
            Err(SplitError::UnlabeledDataset { .. })
        ));
        assert!(matches!(
            source.class_indices(),
            Err(SplitError::UnlabeledDataset { .. })
        ));
    }

    #[test]
    fn default_visit_preserves_requested_order() {
        let source = InMemorySource::from_labels(&[0, 1, 2, 3]);
        let mut seen = Vec::new();
        source
            .visit(&[3, 1], &mut |index, example| {
                seen.push((index, example.label));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(3, Some(3)), (1, Some(1))]);
    }
}
