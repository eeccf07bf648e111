//! Month selection and the `YYYYMM` token used to match header cells and
//! sheet names.

use std::fmt;

use crate::error::LedgerError;

/// Six-digit `YYYYMM` token. Only [`PeriodKey`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodToken(String);

impl PeriodToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeriodToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated (year, month) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Result<Self, LedgerError> {
        if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
            return Err(LedgerError::InvalidPeriod { year, month });
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn token(&self) -> PeriodToken {
        PeriodToken(format!("{:04}{:02}", self.year, self.month))
    }

    /// The month `offset` months away; the year rolls over in both directions.
    /// Fails when the result leaves the four-digit year range.
    pub fn shifted(&self, offset: i32) -> Result<Self, LedgerError> {
        let zero_based = self.month as i32 - 1 + offset;
        Self::new(
            self.year + zero_based.div_euclid(12),
            zero_based.rem_euclid(12) as u32 + 1,
        )
    }

    pub fn adjacent(&self, offset: i32) -> Result<PeriodToken, LedgerError> {
        self.shifted(offset).map(|key| key.token())
    }

    /// Token of the following month, the header that closes this month's
    /// block. December 9999 has none.
    pub fn successor(&self) -> Option<PeriodToken> {
        self.adjacent(1).ok()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

pub fn token(year: i32, month: u32) -> Result<PeriodToken, LedgerError> {
    PeriodKey::new(year, month).map(|key| key.token())
}

pub fn adjacent(year: i32, month: u32, offset: i32) -> Result<PeriodToken, LedgerError> {
    PeriodKey::new(year, month)?.adjacent(offset)
}
