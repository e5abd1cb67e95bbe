//! Builder pattern API for findlock analysis.
//!
//! Provides a fluent interface for configuring and running an analysis:
//!
//! ```rust,ignore
//! use findlock_core::prelude::*;
//!
//! let analysis = Findlock::new()
//!     .with_table(RecognitionTable::classic().with_wait_state("sync.Mutex.Lock"))
//!     .analyze_path(Path::new("goroutines.txt"))?;
//!
//! if let Some(report) = &analysis.report {
//!     println!("{} possible deadlock(s)", report.possible_deadlocks());
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::FindlockConfig;
use crate::detect::{Detector, Report};
use crate::error::{FindlockResult, IoResultExt};
use crate::parse::parse_trace;
use crate::recognize::RecognitionTable;
use crate::trace::Trace;

/// Builder for configuring a dump analysis.
#[derive(Debug, Clone)]
pub struct Findlock {
    /// Wait-state and lock-frame recognition rules
    table: RecognitionTable,

    /// Whether to run the deadlock detector after parsing
    detector: bool,
}

impl Default for Findlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Findlock {
    /// Create a builder with the built-in recognition rules.
    pub fn new() -> Self {
        Self {
            table: RecognitionTable::classic(),
            detector: true,
        }
    }

    /// Replace the recognition table.
    pub fn with_table(mut self, table: RecognitionTable) -> Self {
        self.table = table;
        self
    }

    /// Apply the recognition rules of a config file.
    pub fn with_config(self, cfg: &FindlockConfig, origin: &Path) -> FindlockResult<Self> {
        let table = RecognitionTable::from_config(cfg, origin)?;
        Ok(self.with_table(table))
    }

    /// Enable or disable the deadlock detector.
    pub fn detector(mut self, enabled: bool) -> Self {
        self.detector = enabled;
        self
    }

    pub fn table(&self) -> &RecognitionTable {
        &self.table
    }

    /// Analyze a dump held in memory.
    pub fn analyze_str(&self, input: &str) -> Result<Analysis> {
        self.analyze_reader(input.as_bytes())
    }

    /// Analyze a dump file.
    pub fn analyze_path(&self, path: &Path) -> Result<Analysis> {
        let file = File::open(path).with_path(path)?;
        self.analyze_reader(BufReader::new(file))
            .with_context(|| format!("Failed to analyze {}", path.display()))
    }

    /// Read a dump to completion, then analyze it.
    ///
    /// A parse failure is returned as an error whose source chain contains
    /// [`crate::PartialParse`] with the entries read before the failure.
    pub fn analyze_reader<R: BufRead>(&self, reader: R) -> Result<Analysis> {
        let trace = parse_trace(reader).context("Failed to parse goroutine dump")?;
        Ok(self.analyze_trace(trace))
    }

    /// Run detection (if enabled) over an already parsed trace.
    pub fn analyze_trace(&self, trace: Trace) -> Analysis {
        let report = self
            .detector
            .then(|| Detector::new(&self.table).detect(&trace));
        Analysis { trace, report }
    }
}

/// Result of an analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Every goroutine of the dump
    pub trace: Trace,

    /// Detector output, `None` when the detector was disabled
    pub report: Option<Report>,
}

impl Analysis {
    /// Check if any lock group was found.
    pub fn has_possible_deadlocks(&self) -> bool {
        self.report
            .as_ref()
            .is_some_and(|r| r.possible_deadlocks() > 0)
    }
}
