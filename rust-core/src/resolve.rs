use tracing::warn;

use crate::{Workbook, period::PeriodToken};

/// Index of the sheet named for `token`.
///
/// A name equal to the token wins; otherwise the first name containing it,
/// in workbook order. Several candidates are logged so a mislabelled ledger
/// does not go unnoticed.
pub fn resolve<'a, I>(names: I, token: &PeriodToken) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let candidates: Vec<(usize, &str)> = names
        .into_iter()
        .enumerate()
        .filter(|(_, name)| name.contains(token.as_str()))
        .collect();
    if candidates.len() > 1 {
        let names: Vec<&str> = candidates.iter().map(|(_, name)| *name).collect();
        warn!(%token, ?names, "several sheets match the period");
    }
    candidates
        .iter()
        .find(|(_, name)| *name == token.as_str())
        .or_else(|| candidates.first())
        .map(|(index, _)| *index)
}

pub fn resolve_sheet(workbook: &Workbook, token: &PeriodToken) -> Option<usize> {
    resolve(workbook.sheet_names(), token)
}
