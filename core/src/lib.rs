//! Grouped aggregation over grid usage-accounting records.
//!
//! Records map to a `(date, host, user, VO attribution)` key and a
//! `(cpu, wall)` measure pair. Groups reduce to `(count, cpu, wall)`, and
//! partial results from independent shards merge through `rereduce`.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extract;
pub mod key;
pub mod record;
pub mod scan;
pub mod units;
pub mod view;

pub use aggregate::{AggregateResult, ReduceMode, ReduceValues, aggregate, reduce, rereduce};
pub use config::{Config, ConfigOverrides, ConfigToml, find_acct_home};
pub use error::{ConfigError, MalformedRecordError};
pub use extract::{MeasurePair, extract};
pub use key::{GroupKey, KEY_ARITY, KeyComponent, KeyPrefix};
pub use record::{AccountingRecord, VoAttribute};
pub use scan::{ScanOptions, UsageSnapshot, scan_records, scan_records_at};
pub use units::DurationUnit;
pub use view::{
    Emission, KeyRange, MapOutput, ReducedGroups, RejectedRecord, UsageView, ViewOutput, ViewQuery,
    ViewRow, group_and_reduce, map_records, merge_partials,
};
