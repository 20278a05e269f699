use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

/// Driver termination status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorizeStatus {
    /// Factor-stability tolerance fell below `tol`.
    Converged,
    /// Reached the iteration limit without converging.
    MaxIterations,
    /// The cancellation hook requested an early return.
    Cancelled,
}

/// Per-iteration diagnostics.
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// Iteration index, starting at 0.
    pub iteration: usize,
    /// Factor-stability tolerance, `1 - pearson(current, previous)`.
    pub tol: f64,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

/// Receives iteration updates from the factorization drivers.
pub trait Reporter {
    /// Called after each alternating update pair completes.
    fn on_iteration(&mut self, report: &IterationReport);
    /// Called once after the driver exits.
    fn on_finish(&mut self) {}
}

/// Reporter that prints a UTF-8 `iter | tol` table to stdout or the log.
pub struct StdoutReporter {
    rows: Vec<IterationReport>,
}

impl StdoutReporter {
    /// Create a new stdout reporter.
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("tol").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration + 1).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2e}", row.tol)).set_alignment(CellAlignment::Right),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}

pub(crate) enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    pub(crate) fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }

    pub(crate) fn finish(&mut self) {
        if let Some(r) = self.as_mut() {
            r.on_finish();
        }
    }
}
