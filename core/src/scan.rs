use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::record::AccountingRecord;
use crate::view::{ReducedGroups, ViewQuery, ViewRow, group_and_reduce, map_records, merge_partials};

const RECORD_EXTENSION: &str = "jsonl";
const MAX_DEFAULT_WORKERS: usize = 32;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub records_dir: PathBuf,
    pub max_workers: Option<usize>,
    pub query: ViewQuery,
}

impl ScanOptions {
    pub fn new(records_dir: PathBuf) -> Self {
        Self {
            records_dir,
            max_workers: None,
            query: ViewQuery::default(),
        }
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.max_workers = Some(workers);
        }
        self
    }

    pub fn with_query(mut self, query: ViewQuery) -> Self {
        self.query = query;
        self
    }

    fn effective_worker_count(&self) -> usize {
        if let Some(explicit) = self.max_workers {
            return explicit.max(1);
        }
        let fallback = thread::available_parallelism()
            .ok()
            .map(|n| n.get())
            .unwrap_or(4);
        fallback.clamp(1, MAX_DEFAULT_WORKERS)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UsageSnapshot {
    pub generated_at: DateTime<Utc>,
    pub files_processed: usize,
    pub files_failed: usize,
    pub records_seen: usize,
    pub records_rejected: usize,
    pub invalid_lines: usize,
    pub rows: Vec<ViewRow>,
}

pub fn scan_records(options: ScanOptions) -> Result<UsageSnapshot> {
    scan_records_at(options, Utc::now())
}

pub fn scan_records_at(options: ScanOptions, now: DateTime<Utc>) -> Result<UsageSnapshot> {
    if !options.records_dir.is_dir() {
        bail!(
            "records directory {} does not exist",
            options.records_dir.display()
        );
    }
    let files = collect_record_files(&options.records_dir);
    let workers = options.effective_worker_count();
    debug!(files = files.len(), workers, "scanning usage records");

    let tally = reduce_shards(files, workers);
    Ok(UsageSnapshot {
        generated_at: now,
        files_processed: tally.files_processed,
        files_failed: tally.files_failed,
        records_seen: tally.records_seen,
        records_rejected: tally.records_rejected,
        invalid_lines: tally.invalid_lines,
        rows: options.query.rows(&tally.groups),
    })
}

fn collect_record_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(OsStr::to_str) == Some(RECORD_EXTENSION)
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Per-file reductions plus the counters gathered on the way. Two tallies
/// combine with `rereduce` on shared keys, so any merge order is fine.
#[derive(Debug, Default)]
struct ShardTally {
    groups: ReducedGroups,
    files_processed: usize,
    files_failed: usize,
    records_seen: usize,
    records_rejected: usize,
    invalid_lines: usize,
}

impl ShardTally {
    fn failed() -> Self {
        Self {
            files_failed: 1,
            ..Default::default()
        }
    }

    fn merge(self, other: ShardTally) -> ShardTally {
        ShardTally {
            groups: merge_partials(self.groups, other.groups),
            files_processed: self.files_processed + other.files_processed,
            files_failed: self.files_failed + other.files_failed,
            records_seen: self.records_seen + other.records_seen,
            records_rejected: self.records_rejected + other.records_rejected,
            invalid_lines: self.invalid_lines + other.invalid_lines,
        }
    }
}

fn reduce_shards(files: Vec<PathBuf>, workers: usize) -> ShardTally {
    let shard = |path: PathBuf| match reduce_shard(&path) {
        Ok(tally) => tally,
        Err(err) => {
            warn!(?path, "failed to read record file: {err:#}");
            ShardTally::failed()
        }
    };

    if workers <= 1 {
        return files
            .into_iter()
            .map(shard)
            .fold(ShardTally::default(), ShardTally::merge);
    }

    let job = || {
        files
            .into_par_iter()
            .map(shard)
            .reduce(ShardTally::default, ShardTally::merge)
    };

    match ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(job),
        Err(_) => job(),
    }
}

fn reduce_shard(path: &Path) -> Result<ShardTally> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    let mut records = Vec::new();
    let mut invalid_lines = 0;
    let mut line_number = 0usize;

    // Raw bytes: a line that is not UTF-8 is one invalid entry, not an I/O error.
    while reader
        .read_until(b'\n', &mut buffer)
        .with_context(|| format!("reading {}", path.display()))?
        != 0
    {
        line_number += 1;
        let line = buffer.trim_ascii();
        if !line.is_empty() {
            match serde_json::from_slice::<AccountingRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(?path, line = line_number, "invalid record entry: {err}");
                    invalid_lines += 1;
                }
            }
        }
        buffer.clear();
    }

    let mapped = map_records(&records);
    let records_rejected = mapped.rejected.len();
    debug!(?path, records = records.len(), records_rejected, "reduced shard");
    Ok(ShardTally {
        groups: group_and_reduce(mapped.emissions),
        files_processed: 1,
        files_failed: 0,
        records_seen: records.len(),
        records_rejected,
        invalid_lines,
    })
}
