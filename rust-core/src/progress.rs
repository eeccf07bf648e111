/// Rows between two progress reports.
pub const PROGRESS_EVERY: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StockPrices,
    SalesProfit,
}

/// Checkpoint handed to the caller's progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub row: u32,
    pub total: u32,
}

pub(crate) struct Ticker<'a> {
    stage: Stage,
    total: u32,
    sink: Option<&'a mut dyn FnMut(Progress)>,
}

impl<'a> Ticker<'a> {
    pub(crate) fn new(stage: Stage, total: u32, sink: Option<&'a mut dyn FnMut(Progress)>) -> Self {
        Self { stage, total, sink }
    }

    pub(crate) fn row(&mut self, row: u32) {
        if row % PROGRESS_EVERY == 0 {
            self.emit(row);
        }
    }

    pub(crate) fn finish(&mut self) {
        self.emit(self.total);
    }

    fn emit(&mut self, row: u32) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink(Progress {
                stage: self.stage,
                row,
                total: self.total,
            });
        }
    }
}
