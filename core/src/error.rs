use std::path::PathBuf;

use thiserror::Error;

/// Why a record could not be given a group key.
///
/// Only the basis date can make a record unusable; every other missing
/// field degrades to its default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    #[error("record has neither a usable end_time nor a create_time")]
    MissingBasisDate,

    #[error("basis date {value:?} does not follow the YYYY-MM-DD layout")]
    InvalidBasisDate { value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("group_level must be between 0 and 9, got {0}")]
    InvalidGroupLevel(usize),

    #[error("could not determine a home directory; set ACCT_HOME")]
    NoHome,
}
