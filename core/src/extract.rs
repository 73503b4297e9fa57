use serde::{Deserialize, Serialize};

use crate::error::MalformedRecordError;
use crate::key::GroupKey;
use crate::record::{AccountingRecord, present};

/// End times in this year mean "never set" and fall back to the create time.
const UNSET_YEAR: &str = "1970";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurePair {
    pub cpu_time: f64,
    pub wall_time: f64,
}

impl MeasurePair {
    pub fn new(cpu_time: f64, wall_time: f64) -> Self {
        Self { cpu_time, wall_time }
    }
}

/// Derives the group key and measures for one record.
///
/// The only failure is an unusable basis date; all other fields fall back
/// to `None` or zero.
pub fn extract(record: &AccountingRecord) -> Result<(GroupKey, MeasurePair), MalformedRecordError> {
    let basis = basis_date(record)?;
    let (year, month, day) = parse_fixed_date(basis)?;

    let host = present(&record.machine_name);
    let user = match (
        present(&record.global_user_name),
        host,
        present(&record.local_user_id),
    ) {
        (Some(global), _, _) => Some(global.to_string()),
        (None, Some(machine), Some(local)) => Some(format!("{machine}:{local}")),
        _ => None,
    };
    let vo = present(&record.vo_name)
        .filter(|name| !name.starts_with('/'))
        .map(str::to_string);
    let first_attr = record.vo_attrs.as_deref().and_then(<[_]>::first);

    let key = GroupKey {
        year,
        month,
        day,
        host: host.map(str::to_string),
        user,
        vo_issuer: present(&record.vo_issuer).map(str::to_string),
        vo,
        vo_group: first_attr
            .and_then(|attr| present(&attr.group))
            .map(str::to_string),
        vo_role: first_attr
            .and_then(|attr| present(&attr.role))
            .map(str::to_string),
    };
    let measures = MeasurePair::new(
        record.cpu_duration.unwrap_or_default(),
        record.wall_duration.unwrap_or_default(),
    );
    Ok((key, measures))
}

fn basis_date(record: &AccountingRecord) -> Result<&str, MalformedRecordError> {
    if let Some(end) = present(&record.end_time)
        && end.get(0..4) != Some(UNSET_YEAR)
    {
        return Ok(end);
    }
    present(&record.create_time).ok_or(MalformedRecordError::MissingBasisDate)
}

/// Reads year, month and day from fixed offsets of a `YYYY-MM-DD...` string.
/// Separators are not checked.
fn parse_fixed_date(value: &str) -> Result<(i32, u32, u32), MalformedRecordError> {
    let invalid = || MalformedRecordError::InvalidBasisDate {
        value: value.to_string(),
    };
    let year = digits(value, 0, 4).ok_or_else(invalid)?;
    let month = digits(value, 5, 7).ok_or_else(invalid)?;
    let day = digits(value, 8, 10).ok_or_else(invalid)?;
    Ok((year as i32, month, day))
}

fn digits(value: &str, start: usize, end: usize) -> Option<u32> {
    let slice = value.get(start..end)?;
    if !slice.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    slice.parse().ok()
}
