//! Map, group and reduce over in-memory records.
//!
//! Grouping is a sort-and-group on [`GroupKey`]. Reduced groups can be
//! merged with other shards or re-reduced to a shorter key prefix; both go
//! through [`rereduce`], never back through raw measures.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregate::{AggregateResult, reduce, rereduce};
use crate::error::MalformedRecordError;
use crate::extract::{MeasurePair, extract};
use crate::key::{GroupKey, KEY_ARITY, KeyPrefix};
use crate::record::AccountingRecord;

/// Reduced groups keyed by their full key.
pub type ReducedGroups = BTreeMap<GroupKey, AggregateResult>;

#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub key: GroupKey,
    pub value: MeasurePair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub record_id: String,
    pub error: MalformedRecordError,
}

#[derive(Debug, Clone, Default)]
pub struct MapOutput {
    pub emissions: Vec<Emission>,
    pub rejected: Vec<RejectedRecord>,
}

/// Runs the extractor over every record. Malformed records are collected
/// and logged; they never stop the rest of the batch.
pub fn map_records<'a, I>(records: I) -> MapOutput
where
    I: IntoIterator<Item = &'a AccountingRecord>,
{
    let mut output = MapOutput::default();
    for record in records {
        match extract(record) {
            Ok((key, value)) => output.emissions.push(Emission { key, value }),
            Err(error) => {
                warn!(record_id = record.display_id(), "skipping record: {error}");
                output.rejected.push(RejectedRecord {
                    record_id: record.display_id().to_string(),
                    error,
                });
            }
        }
    }
    output
}

pub fn group_and_reduce(emissions: Vec<Emission>) -> ReducedGroups {
    let mut grouped: BTreeMap<GroupKey, Vec<MeasurePair>> = BTreeMap::new();
    for emission in emissions {
        grouped.entry(emission.key).or_default().push(emission.value);
    }
    grouped
        .into_iter()
        .map(|(key, values)| {
            let result = reduce(&values);
            (key, result)
        })
        .collect()
}

/// Merges two independently reduced shards.
pub fn merge_partials(mut left: ReducedGroups, right: ReducedGroups) -> ReducedGroups {
    for (key, value) in right {
        left.entry(key)
            .and_modify(|existing| *existing = rereduce(&[*existing, value]))
            .or_insert(value);
    }
    left
}

/// Inclusive date bounds applied to the date part of each key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl KeyRange {
    pub fn contains(&self, key: &GroupKey) -> bool {
        let date = key.date_parts();
        if let Some(since) = self.since
            && date < date_parts(since)
        {
            return false;
        }
        if let Some(until) = self.until
            && date > date_parts(until)
        {
            return false;
        }
        true
    }
}

fn date_parts(date: NaiveDate) -> (i32, u32, u32) {
    (date.year(), date.month(), date.day())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// Leading key components to group on. `None` keeps exact keys.
    pub group_level: Option<usize>,
    pub range: KeyRange,
}

impl ViewQuery {
    pub fn with_group_level(mut self, level: usize) -> Self {
        self.group_level = Some(level.min(KEY_ARITY));
        self
    }

    pub fn with_since(mut self, since: NaiveDate) -> Self {
        self.range.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.range.until = Some(until);
        self
    }

    fn effective_level(&self) -> usize {
        self.group_level.unwrap_or(KEY_ARITY).min(KEY_ARITY)
    }

    /// Filters reduced groups by range and folds them to the requested
    /// group level. Rows come back in key order.
    pub fn rows(&self, groups: &ReducedGroups) -> Vec<ViewRow> {
        let level = self.effective_level();
        let mut folded: BTreeMap<KeyPrefix, Vec<AggregateResult>> = BTreeMap::new();
        for (key, value) in groups {
            if !self.range.contains(key) {
                continue;
            }
            folded.entry(key.prefix(level)).or_default().push(*value);
        }
        folded
            .into_iter()
            .map(|(key, partials)| ViewRow {
                key,
                value: rereduce(&partials),
            })
            .collect()
    }
}

/// A finalized row handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub key: KeyPrefix,
    pub value: AggregateResult,
}

#[derive(Debug, Clone, Default)]
pub struct ViewOutput {
    pub rows: Vec<ViewRow>,
    pub records_seen: usize,
    pub rejected: Vec<RejectedRecord>,
}

pub struct UsageView;

impl UsageView {
    /// Map, group, reduce and query a batch of records in one pass.
    pub fn build<'a, I>(records: I, query: &ViewQuery) -> ViewOutput
    where
        I: IntoIterator<Item = &'a AccountingRecord>,
    {
        let mapped = map_records(records);
        let records_seen = mapped.emissions.len() + mapped.rejected.len();
        let groups = group_and_reduce(mapped.emissions);
        ViewOutput {
            rows: query.rows(&groups),
            records_seen,
            rejected: mapped.rejected,
        }
    }
}
