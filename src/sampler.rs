use std::collections::BTreeSet;

use tracing::debug;

use crate::constants::sampler::{
    CLASS_SEED_BASE, SPLITMIX_GAMMA, SPLITMIX_MUL_1, SPLITMIX_MUL_2,
};
use crate::data::{ClassCounts, ClassId, ClassIndex, ExampleIndex};
use crate::errors::SplitError;
use crate::hash::index_fingerprint;
use crate::source::RecordSource;
use crate::types::Fingerprint;

/// SplitMix64 generator; the single source of randomness for split selection.
///
/// Output for a given seed is fixed forever (`ALGORITHM` is bumped otherwise),
/// which is what lets independent runs agree on a split.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(SPLITMIX_GAMMA);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(SPLITMIX_MUL_1);
        z = (z ^ (z >> 27)).wrapping_mul(SPLITMIX_MUL_2);
        z ^ (z >> 31)
    }

    /// Uniform draw in `[0, bound)` by rejection on the largest multiple of
    /// `bound` not exceeding 2^64. `bound` must be non-zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let bound = u128::from(bound);
        let zone = ((1u128 << 64) / bound) * bound;
        loop {
            let value = u128::from(self.next_u64());
            if value < zone {
                return (value % bound) as u64;
            }
        }
    }

    /// Durstenfeld Fisher–Yates: for `i` from `len - 1` down to `1`, swap
    /// `i` with `below(i + 1)`.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

/// Sub-seed for class `class` under split seed `seed`.
pub fn class_seed(seed: u64, class: ClassId) -> u64 {
    seed ^ CLASS_SEED_BASE.wrapping_add(u64::from(class))
}

/// Parameters of one split: which seed, how many examples, and whether the
/// quota is enforced per class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SplitRequest {
    pub seed: u64,
    pub size: u64,
    pub class_balanced: bool,
}

impl SplitRequest {
    pub fn new(seed: u64, size: u64, class_balanced: bool) -> Self {
        Self {
            seed,
            size,
            class_balanced,
        }
    }

    /// Validate a signed size coming from an untyped boundary (CLI, config).
    pub fn try_new(seed: u64, size: i64, class_balanced: bool) -> Result<Self, SplitError> {
        let size = u64::try_from(size)
            .map_err(|_| SplitError::value("size", format!("{size} is negative")))?;
        Ok(Self::new(seed, size, class_balanced))
    }
}

/// What the sampler draws from.
#[derive(Clone, Copy, Debug)]
pub enum Population<'a> {
    /// Indices `[0, N)` without class information.
    Total(u64),
    /// Per-class index lists; together they must partition `[0, N)`.
    Classes(&'a ClassIndex),
}

/// Outcome of sampling: the selected global indices plus the parameters
/// that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitResult {
    /// Selected indices, iterated in ascending (source) order.
    pub selected_indices: BTreeSet<ExampleIndex>,
    pub request: SplitRequest,
    /// Per-class quotas; empty for uniform splits.
    pub quotas: ClassCounts,
    /// Size `N` of the population the split was drawn from.
    pub population: u64,
}

impl SplitResult {
    pub fn seed(&self) -> u64 {
        self.request.seed
    }

    pub fn size(&self) -> u64 {
        self.request.size
    }

    pub fn class_balanced(&self) -> bool {
        self.request.class_balanced
    }

    /// Selected indices as an ascending vector.
    pub fn sorted_indices(&self) -> Vec<ExampleIndex> {
        self.selected_indices.iter().copied().collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        index_fingerprint(&self.selected_indices)
    }
}

/// Per-class quotas: `floor(size / C)` each, with the `size mod C` remainder
/// going one apiece to the lowest class ids.
pub fn class_quotas(classes: &[ClassId], size: u64) -> ClassCounts {
    let mut quotas = ClassCounts::new();
    if classes.is_empty() {
        return quotas;
    }
    let count = classes.len() as u64;
    let base = size / count;
    let remainder = size % count;
    let mut ordered = classes.to_vec();
    ordered.sort_unstable();
    for (position, class) in ordered.into_iter().enumerate() {
        let extra = u64::from((position as u64) < remainder);
        quotas.insert(class, base + extra);
    }
    quotas
}

/// Select `request.size` indices from `population`.
pub fn sample(population: Population<'_>, request: &SplitRequest) -> Result<SplitResult, SplitError> {
    let result = match (population, request.class_balanced) {
        (Population::Total(_), true) => {
            return Err(SplitError::UnlabeledDataset {
                operation: "class-balanced sampling",
            });
        }
        (Population::Total(total), false) => sample_uniform(total, request)?,
        (Population::Classes(index), false) => {
            let total = validate_partition(index)?;
            sample_uniform(total, request)?
        }
        (Population::Classes(index), true) => sample_balanced(index, request)?,
    };
    debug!(
        seed = request.seed,
        size = request.size,
        class_balanced = request.class_balanced,
        population = result.population,
        fingerprint = %result.fingerprint(),
        "sampled split"
    );
    Ok(result)
}

/// Sample directly from a record source, reading its label index when the
/// request is class-balanced.
pub fn sample_source<S>(source: &S, request: &SplitRequest) -> Result<SplitResult, SplitError>
where
    S: RecordSource + ?Sized,
{
    if request.class_balanced {
        let index = source.class_indices()?;
        sample(Population::Classes(&index), request)
    } else {
        sample(Population::Total(source.len()), request)
    }
}

fn sample_uniform(total: u64, request: &SplitRequest) -> Result<SplitResult, SplitError> {
    if request.size > total {
        return Err(SplitError::InsufficientExamples {
            details: format!(
                "requested {} examples from a dataset of {total}",
                request.size
            ),
        });
    }
    let mut order: Vec<ExampleIndex> = (0..total).collect();
    DeterministicRng::new(request.seed).shuffle(&mut order);
    let selected_indices = order.into_iter().take(request.size as usize).collect();
    Ok(SplitResult {
        selected_indices,
        request: *request,
        quotas: ClassCounts::new(),
        population: total,
    })
}

fn sample_balanced(index: &ClassIndex, request: &SplitRequest) -> Result<SplitResult, SplitError> {
    let total = validate_partition(index)?;
    let classes: Vec<ClassId> = index.keys().copied().collect();
    if classes.is_empty() && request.size > 0 {
        return Err(SplitError::InsufficientExamples {
            details: format!(
                "requested {} examples from a dataset with no classes",
                request.size
            ),
        });
    }
    let quotas = class_quotas(&classes, request.size);
    for (class, quota) in &quotas {
        let available = index.get(class).map_or(0, Vec::len) as u64;
        if *quota > available {
            return Err(SplitError::short_class(
                *class,
                *quota as usize,
                available as usize,
            ));
        }
    }

    let mut selected_indices = BTreeSet::new();
    for (class, quota) in &quotas {
        let mut members = index.get(class).cloned().unwrap_or_default();
        members.sort_unstable();
        DeterministicRng::new(class_seed(request.seed, *class)).shuffle(&mut members);
        selected_indices.extend(members.into_iter().take(*quota as usize));
    }
    Ok(SplitResult {
        selected_indices,
        request: *request,
        quotas,
        population: total,
    })
}

/// Check that the class lists are disjoint and cover exactly `[0, N)`; returns `N`.
fn validate_partition(index: &ClassIndex) -> Result<u64, SplitError> {
    let total: u64 = index.values().map(|members| members.len() as u64).sum();
    let mut seen = vec![false; total as usize];
    for (class, members) in index {
        for &member in members {
            let slot = seen.get_mut(member as usize).ok_or_else(|| {
                SplitError::value(
                    "class index",
                    format!("class {class} lists index {member}, outside [0, {total})"),
                )
            })?;
            if *slot {
                return Err(SplitError::value(
                    "class index",
                    format!("index {member} is listed more than once"),
                ));
            }
            *slot = true;
        }
    }
    Ok(total)
}
