use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::key::KEY_ARITY;
use crate::scan::ScanOptions;
use crate::units::DurationUnit;
use crate::view::{KeyRange, ViewQuery};

pub const ACCT_HOME_ENV_VAR: &str = "ACCT_HOME";
const DEFAULT_HOME_DIR: &str = ".acct";
const CONFIG_FILE_NAME: &str = "config.toml";
const RECORDS_SUBDIR: &str = "records";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    pub records_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub group_level: Option<usize>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub unit: Option<DurationUnit>,
}

/// Values supplied on the command line; these win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub records_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub group_level: Option<usize>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub unit: Option<DurationUnit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub acct_home: PathBuf,
    pub records_dir: PathBuf,
    pub workers: Option<usize>,
    pub query: ViewQuery,
    pub unit: DurationUnit,
}

impl Config {
    /// Loads `<home>/config.toml` (or `config_file` when given) and applies
    /// the overrides. A missing default config file is not an error.
    pub fn load(
        acct_home: PathBuf,
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let cfg = match config_file {
            Some(path) => read_config_toml(path)?,
            None => {
                let default_path = acct_home.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    read_config_toml(&default_path)?
                } else {
                    ConfigToml::default()
                }
            }
        };
        Self::load_from_base_config_with_overrides(cfg, overrides, acct_home)
    }

    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load(find_acct_home()?, None, overrides)
    }

    pub fn load_from_base_config_with_overrides(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        acct_home: PathBuf,
    ) -> Result<Self, ConfigError> {
        let group_level = overrides.group_level.or(cfg.group_level);
        if let Some(level) = group_level
            && level > KEY_ARITY
        {
            return Err(ConfigError::InvalidGroupLevel(level));
        }

        let records_dir = overrides
            .records_dir
            .or(cfg.records_dir)
            .unwrap_or_else(|| acct_home.join(RECORDS_SUBDIR));
        let records_dir = if records_dir.is_relative() {
            acct_home.join(records_dir)
        } else {
            records_dir
        };

        Ok(Self {
            records_dir,
            workers: overrides.workers.or(cfg.workers).filter(|w| *w > 0),
            query: ViewQuery {
                group_level,
                range: KeyRange {
                    since: overrides.since.or(cfg.since),
                    until: overrides.until.or(cfg.until),
                },
            },
            unit: overrides.unit.or(cfg.unit).unwrap_or_default(),
            acct_home,
        })
    }

    pub fn scan_options(&self) -> ScanOptions {
        let mut options = ScanOptions::new(self.records_dir.clone()).with_query(self.query);
        if let Some(workers) = self.workers {
            options = options.with_max_workers(workers);
        }
        options
    }
}

fn read_config_toml(path: &Path) -> Result<ConfigToml, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `$ACCT_HOME` when set and non-empty, otherwise `~/.acct`. The directory
/// does not have to exist.
pub fn find_acct_home() -> Result<PathBuf, ConfigError> {
    if let Some(value) = std::env::var_os(ACCT_HOME_ENV_VAR)
        && !value.is_empty()
    {
        return Ok(PathBuf::from(value));
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_HOME_DIR))
        .ok_or(ConfigError::NoHome)
}
