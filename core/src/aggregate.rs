use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::extract::MeasurePair;

/// Record count and summed measures for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub count: u64,
    pub cpu_total: f64,
    pub wall_total: f64,
}

impl AggregateResult {
    pub fn new(count: u64, cpu_total: f64, wall_total: f64) -> Self {
        Self {
            count,
            cpu_total,
            wall_total,
        }
    }
}

impl Add for AggregateResult {
    type Output = AggregateResult;

    fn add(self, other: AggregateResult) -> AggregateResult {
        AggregateResult {
            count: self.count.saturating_add(other.count),
            cpu_total: self.cpu_total + other.cpu_total,
            wall_total: self.wall_total + other.wall_total,
        }
    }
}

impl Sum for AggregateResult {
    fn sum<I: Iterator<Item = AggregateResult>>(iter: I) -> Self {
        iter.fold(AggregateResult::default(), Add::add)
    }
}

impl<'a> Sum<&'a AggregateResult> for AggregateResult {
    fn sum<I: Iterator<Item = &'a AggregateResult>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceMode {
    /// Values are raw measure pairs straight from the extractor.
    Reduce,
    /// Values are results of earlier reductions of the same key.
    Rereduce,
}

/// The values of one group, tagged with the shape the caller is passing.
#[derive(Debug, Clone, Copy)]
pub enum ReduceValues<'a> {
    Raw(&'a [MeasurePair]),
    Partial(&'a [AggregateResult]),
}

impl ReduceValues<'_> {
    pub fn mode(&self) -> ReduceMode {
        match self {
            ReduceValues::Raw(_) => ReduceMode::Reduce,
            ReduceValues::Partial(_) => ReduceMode::Rereduce,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReduceValues::Raw(values) => values.len(),
            ReduceValues::Partial(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Folds one group's values. All values must share a key; grouping is the
/// caller's job.
pub fn aggregate(values: ReduceValues<'_>) -> AggregateResult {
    match values {
        ReduceValues::Raw(pairs) => reduce(pairs),
        ReduceValues::Partial(partials) => rereduce(partials),
    }
}

/// First-level reduction over raw measure pairs.
pub fn reduce(values: &[MeasurePair]) -> AggregateResult {
    let (cpu_total, wall_total) = values
        .iter()
        .fold((0.0, 0.0), |(cpu, wall), pair| {
            (cpu + pair.cpu_time, wall + pair.wall_time)
        });
    AggregateResult::new(values.len() as u64, cpu_total, wall_total)
}

/// Merges partial results computed over disjoint subsets of one group.
pub fn rereduce(values: &[AggregateResult]) -> AggregateResult {
    values.iter().sum()
}
