use std::fmt::Write as _;
use std::path::PathBuf;

use acct_core::{
    Config, ConfigOverrides, DurationUnit, KeyComponent, UsageSnapshot, ViewRow, find_acct_home,
    scan_records,
};
use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::Parser;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(author, version, about = "Summarize CPU and wall time from usage records", long_about = None)]
pub struct UsageCommand {
    /// Read settings from this file instead of $ACCT_HOME/config.toml
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory scanned recursively for *.jsonl record files
    #[arg(long = "records-dir", value_name = "DIR")]
    pub records_dir: Option<PathBuf>,

    /// Maximum worker threads to use while reducing files (default: CPU count)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Group rows on the first N key fields (0-9; 3 = per day, 4 = per host)
    #[arg(long = "group-level", value_name = "N", value_parser = clap::value_parser!(u8).range(0..=9))]
    pub group_level: Option<u8>,

    /// Only include records dated on or after this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Only include records dated on or before this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Shorthand for --since <today minus N days>
    #[arg(long = "last-days", value_name = "N", conflicts_with = "since")]
    pub last_days: Option<u64>,

    /// Unit for summed durations: seconds, minutes, hours or days
    #[arg(long, value_name = "UNIT")]
    pub unit: Option<DurationUnit>,

    /// Print rows as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl UsageCommand {
    pub fn run(self) -> Result<()> {
        let json = self.json;
        let home = find_acct_home()?;
        let config = self.load_config(home, Utc::now().date_naive())?;
        debug!(
            records_dir = %config.records_dir.display(),
            workers = ?config.workers,
            group_level = ?config.query.group_level,
            "loaded configuration"
        );
        let snapshot = scan_records(config.scan_options())?;
        debug!(rows = snapshot.rows.len(), "scan finished");
        let output = if json {
            render_json(&snapshot, config.unit)?
        } else {
            render_text(&snapshot, config.unit)
        };
        print!("{output}");
        Ok(())
    }

    /// Resolves flags against `<home>/config.toml` (or `--config`).
    /// `today` anchors `--last-days`.
    fn load_config(self, home: PathBuf, today: NaiveDate) -> Result<Config> {
        let since = match self.last_days {
            Some(days) => Some(
                today
                    .checked_sub_days(Days::new(days))
                    .context("--last-days reaches before the supported date range")?,
            ),
            None => self.since,
        };
        let overrides = ConfigOverrides {
            records_dir: self.records_dir,
            workers: self.workers,
            group_level: self.group_level.map(usize::from),
            since,
            until: self.until,
            unit: self.unit,
        };
        Config::load(home, self.config.as_deref(), overrides).context("loading configuration")
    }
}

pub fn render_text(snapshot: &UsageSnapshot, unit: DurationUnit) -> String {
    let mut out = String::new();
    let generated_at = snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC");
    let _ = writeln!(out, "Usage records as of {generated_at}");
    let _ = writeln!(
        out,
        "Files: {} (unreadable: {})  ·  records: {}  ·  rejected: {}  ·  invalid lines: {}",
        snapshot.files_processed,
        snapshot.files_failed,
        format_with_separators(snapshot.records_seen as u64),
        snapshot.records_rejected,
        snapshot.invalid_lines,
    );

    if snapshot.rows.is_empty() {
        let _ = writeln!(out, "\n  (no matching records)");
        return out;
    }

    let _ = writeln!(out, "\nCPU and wall time in {unit}:");
    for row in &snapshot.rows {
        let _ = writeln!(
            out,
            "  {:<48} jobs={:>10}  cpu={:>14}  wall={:>14}",
            row_label(row),
            format_with_separators(row.value.count),
            fmt_duration(unit.convert(row.value.cpu_total)),
            fmt_duration(unit.convert(row.value.wall_total)),
        );
    }
    out
}

pub fn render_json(snapshot: &UsageSnapshot, unit: DurationUnit) -> Result<String> {
    let rows: Vec<_> = snapshot
        .rows
        .iter()
        .map(|row| {
            json!({
                "key": row.key,
                "value": [
                    row.value.count,
                    unit.convert(row.value.cpu_total),
                    unit.convert(row.value.wall_total),
                ],
            })
        })
        .collect();
    let body = json!({
        "generated_at": snapshot.generated_at.to_rfc3339(),
        "unit": unit.as_str(),
        "files_processed": snapshot.files_processed,
        "records_seen": snapshot.records_seen,
        "records_rejected": snapshot.records_rejected,
        "invalid_lines": snapshot.invalid_lines,
        "rows": rows,
    });
    let mut rendered = serde_json::to_string_pretty(&body)?;
    rendered.push('\n');
    Ok(rendered)
}

fn row_label(row: &ViewRow) -> String {
    if row.key.is_empty() {
        return "(all)".to_string();
    }
    let components = row.key.components();
    let mut label = String::new();
    for (idx, component) in components.iter().enumerate() {
        let separator = match idx {
            0 => "",
            1 | 2 => "-",
            _ => " ",
        };
        label.push_str(separator);
        match (idx, component) {
            (1 | 2, KeyComponent::Int(value)) => {
                let _ = write!(label, "{value:02}");
            }
            _ => {
                let _ = write!(label, "{component}");
            }
        }
    }
    label
}

fn fmt_duration(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let whole = value as i64;
        let sign = if whole < 0 { "-" } else { "" };
        format!("{sign}{}", format_with_separators(whole.unsigned_abs()))
    } else {
        format!("{value:.1}")
    }
}

fn format_with_separators(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use acct_core::{AggregateResult, KeyPrefix};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot(rows: Vec<ViewRow>) -> UsageSnapshot {
        UsageSnapshot {
            generated_at: Utc
                .with_ymd_and_hms(2021, 1, 3, 12, 0, 0)
                .single()
                .expect("valid timestamp"),
            files_processed: 2,
            records_seen: 1_234,
            rows,
            ..Default::default()
        }
    }

    fn day_row(day: i64, host: Option<&str>, value: AggregateResult) -> ViewRow {
        let mut key = vec![
            KeyComponent::Int(2021),
            KeyComponent::Int(1),
            KeyComponent::Int(day),
        ];
        if let Some(host) = host {
            key.push(KeyComponent::Text(host.to_string()));
        }
        ViewRow {
            key: KeyPrefix(key),
            value,
        }
    }

    #[test]
    fn separators_group_thousands() {
        assert_eq!(format_with_separators(0), "0");
        assert_eq!(format_with_separators(999), "999");
        assert_eq!(format_with_separators(1_000), "1,000");
        assert_eq!(format_with_separators(12_345_678), "12,345,678");
    }

    #[test]
    fn durations_keep_their_sign() {
        assert_eq!(fmt_duration(3_600.0), "3,600");
        assert_eq!(fmt_duration(-3_600.0), "-3,600");
        assert_eq!(fmt_duration(-0.5), "-0.5");
        assert_eq!(fmt_duration(1.26), "1.3");
    }

    #[test]
    fn labels_pad_dates_and_show_nulls() {
        let row = ViewRow {
            key: KeyPrefix(vec![
                KeyComponent::Int(2021),
                KeyComponent::Int(1),
                KeyComponent::Int(2),
                KeyComponent::Text("h1".to_string()),
                KeyComponent::Null,
            ]),
            value: AggregateResult::default(),
        };
        assert_eq!(row_label(&row), "2021-01-02 h1 -");
        assert_eq!(
            row_label(&ViewRow {
                key: KeyPrefix(Vec::new()),
                value: AggregateResult::default()
            }),
            "(all)"
        );
    }

    #[test]
    fn text_report_lists_rows_in_unit() {
        let snap = snapshot(vec![day_row(
            1,
            Some("h1"),
            AggregateResult::new(2, 5_400.0, 9_000.0),
        )]);
        let text = render_text(&snap, DurationUnit::Hours);

        assert!(text.starts_with("Usage records as of 2021-01-03 12:00:00 UTC\n"));
        assert!(text.contains("records: 1,234"));
        assert!(text.contains("CPU and wall time in hours:"));
        assert!(text.contains("2021-01-01 h1"));
        assert!(text.contains("jobs=         2"));
        assert!(text.contains("cpu=           1.5"));
        assert!(text.contains("wall=           2.5"));
    }

    #[test]
    fn text_report_handles_no_rows() {
        let text = render_text(&snapshot(Vec::new()), DurationUnit::Seconds);
        assert!(text.contains("(no matching records)"));
    }

    #[test]
    fn json_rows_use_view_shape() {
        let snap = snapshot(vec![day_row(2, None, AggregateResult::new(3, 120.0, 600.0))]);
        let rendered = render_json(&snap, DurationUnit::Minutes).expect("json");
        let value: serde_json::Value = serde_json::from_str(&rendered).expect("parse");

        assert_eq!(value["unit"], "minutes");
        assert_eq!(value["records_seen"], 1_234);
        assert_eq!(
            value["rows"],
            json!([{"key": [2021, 1, 2], "value": [3, 2.0, 10.0]}])
        );
    }

    #[test]
    fn parses_flags() {
        let cmd = UsageCommand::try_parse_from([
            "acct-usage",
            "--records-dir",
            "/tmp/records",
            "--group-level",
            "4",
            "--since",
            "2021-01-01",
            "--unit",
            "days",
            "--json",
        ])
        .expect("parse");
        assert_eq!(cmd.records_dir, Some(PathBuf::from("/tmp/records")));
        assert_eq!(cmd.group_level, Some(4));
        assert_eq!(cmd.since, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(cmd.unit, Some(DurationUnit::Days));
        assert!(cmd.json);

        assert!(UsageCommand::try_parse_from(["acct-usage", "--group-level", "10"]).is_err());
        assert!(
            UsageCommand::try_parse_from([
                "acct-usage",
                "--since",
                "2021-01-01",
                "--last-days",
                "7"
            ])
            .is_err()
        );
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn config_flag_replaces_home_config_file() {
        let temp = TempDir::new().expect("tempdir");
        let home = temp.path().join("home");
        fs::create_dir_all(&home).expect("home dir");
        fs::write(home.join("config.toml"), "unit = \"days\"\ngroup_level = 3\n").expect("write");
        let custom = temp.path().join("site.toml");
        fs::write(&custom, "unit = \"hours\"\nworkers = 2\nrecords_dir = \"shards\"\n")
            .expect("write");

        let cmd = UsageCommand::try_parse_from([
            "acct-usage",
            "--config",
            custom.to_str().expect("utf-8 path"),
            "--group-level",
            "4",
        ])
        .expect("parse");
        let config = cmd.load_config(home.clone(), date("2021-03-10")).expect("config");

        assert_eq!(config.acct_home, home);
        assert_eq!(config.unit, DurationUnit::Hours);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.records_dir, home.join("shards"));
        assert_eq!(config.query.group_level, Some(4));
        assert_eq!(config.query.range.since, None);
    }

    #[test]
    fn records_dir_and_last_days_flags_win() {
        let temp = TempDir::new().expect("tempdir");
        let home = temp.path().to_path_buf();
        fs::write(
            home.join("config.toml"),
            "records_dir = \"from-file\"\nsince = \"2020-01-01\"\nuntil = \"2021-12-31\"\n",
        )
        .expect("write");
        let records = temp.path().join("cli-records");

        let cmd = UsageCommand::try_parse_from([
            "acct-usage",
            "--records-dir",
            records.to_str().expect("utf-8 path"),
            "--last-days",
            "7",
        ])
        .expect("parse");
        let config = cmd.load_config(home, date("2021-03-10")).expect("config");

        assert_eq!(config.records_dir, records);
        assert_eq!(config.query.range.since, Some(date("2021-03-03")));
        assert_eq!(config.query.range.until, Some(date("2021-12-31")));
        assert_eq!(config.unit, DurationUnit::Seconds);
    }

    #[test]
    fn missing_config_flag_file_is_reported() {
        let temp = TempDir::new().expect("tempdir");
        let cmd = UsageCommand::try_parse_from([
            "acct-usage",
            "--config",
            temp.path().join("absent.toml").to_str().expect("utf-8 path"),
        ])
        .expect("parse");
        let err = cmd
            .load_config(temp.path().to_path_buf(), date("2021-03-10"))
            .expect_err("missing config");
        assert!(format!("{err:#}").contains("loading configuration"));
    }
}
