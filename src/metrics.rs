use crate::data::{ClassCounts, ClassId};

/// Aggregate balance metrics for per-class example counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSkew {
    pub total: u64,
    pub classes: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    /// `max / min`; infinite when some class is empty.
    pub ratio: f64,
    /// Ascending class id.
    pub per_class: Vec<ClassShare>,
}

/// One class's share of the dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassShare {
    pub class: ClassId,
    pub count: u64,
    pub share: f64,
}

/// Compute balance metrics from per-class counts; `None` when there are no classes.
pub fn class_skew(counts: &ClassCounts) -> Option<ClassSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: u64 = counts.values().sum();
    let classes = counts.len();
    let share = |count: u64| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let per_class = counts
        .iter()
        .map(|(class, count)| ClassShare {
            class: *class,
            count: *count,
            share: share(*count),
        })
        .collect();
    Some(ClassSkew {
        total,
        classes,
        min,
        max,
        mean: total as f64 / classes as f64,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_class,
    })
}

/// Format an integer with `,` thousands separators.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, ch) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
