use std::collections::BTreeMap;

pub use crate::types::{ClassId, ExampleIndex};

/// Per-class example counts, ordered by ascending class id.
pub type ClassCounts = BTreeMap<ClassId, u64>;

/// Per-class global index lists (ascending), ordered by ascending class id.
pub type ClassIndex = BTreeMap<ClassId, Vec<ExampleIndex>>;

/// One dataset example: an opaque encoded image payload plus an optional label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Example {
    /// Encoded image bytes, carried verbatim through every stage.
    pub payload: Vec<u8>,
    /// Class label; `None` in label-stripped views.
    pub label: Option<ClassId>,
}

impl Example {
    pub fn labeled(payload: impl Into<Vec<u8>>, label: ClassId) -> Self {
        Self {
            payload: payload.into(),
            label: Some(label),
        }
    }

    pub fn unlabeled(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            label: None,
        }
    }

    /// Same payload with the label removed.
    pub fn without_label(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            label: None,
        }
    }
}
