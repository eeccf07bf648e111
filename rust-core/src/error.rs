use std::{error::Error as StdError, path::PathBuf};

use thiserror::Error;

use crate::{period::PeriodToken, persist::SaveError};

/// Failures that abort a whole ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid period {year}-{month:02}: month must be 1-12 and the year four digits")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("period {token} was not found in the price table header")]
    PeriodNotFound { token: PeriodToken },

    #[error("no sheet name contains period {token}")]
    SheetNotFound { token: PeriodToken },

    #[error("sheet '{name}' is missing from {}", path.display())]
    SourceSheetMissing { name: String, path: PathBuf },

    #[error("{} is open in another program; close it and try again", path.display())]
    FileLocked { path: PathBuf },

    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("configuration value `{key}` must be a positive integer")]
    InvalidConfig { key: &'static str },
}

impl LedgerError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        LedgerError::Io {
            action,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Process exit status the shell reports for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            LedgerError::PeriodNotFound { .. } => 2,
            LedgerError::SheetNotFound { .. } => 3,
            LedgerError::SourceSheetMissing { .. } => 4,
            LedgerError::FileLocked { .. } => 5,
            LedgerError::InvalidPeriod { .. } | LedgerError::InvalidConfig { .. } => 64,
            LedgerError::Io { .. } => 1,
        }
    }
}

impl From<SaveError> for LedgerError {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::FileLocked { path, .. } => LedgerError::FileLocked { path },
            SaveError::Io { path, source } => LedgerError::Io {
                action: "save",
                path,
                source,
            },
        }
    }
}

/// A sales cell that does not read as a number. Row-scoped: the row is
/// skipped and the operation carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read {value:?} as a number")]
pub struct DataConversionError {
    value: String,
}

impl DataConversionError {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}
