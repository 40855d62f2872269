//! A host-facing, verbosity-filtered view over a run's results.
//!
//! This is a separate surface from the raw [`crate::engine::KipResult`]
//! sequence [`crate::engine::Engine::interpret_lines`] returns (which is
//! undeduplicated, one entry per executed instruction — the complete prefix
//! of successes plus any terminal failure). A [`ResultLog`] is what a host
//! like the CLI prints: it drops results too quiet for the configured
//! verbosity, and it collapses an immediately repeated identical entry into
//! one line.

use crate::engine::KipResult;
use crate::opcode;

pub struct ResultLog {
    entries: Vec<KipResult>,
}

impl ResultLog {
    /// `reserve_hint` scales the log's initial capacity; pass the number of
    /// results you expect to feed in (e.g. the run's instruction budget).
    pub fn new(reserve_hint: usize) -> ResultLog {
        ResultLog { entries: Vec::with_capacity(reserve_hint) }
    }

    /// Feed one result from a run into the log, applying verbosity
    /// filtering and adjacent-duplicate suppression.
    pub fn record(&mut self, result: KipResult, run_verbosity: u8) {
        let threshold = opcode::by_id(result.opcode_id).map(|o| o.verbosity).unwrap_or(0);
        if !result.success || run_verbosity >= threshold {
            if let Some(last) = self.entries.last() {
                if last.success == result.success && last.message == result.message {
                    return;
                }
            }
            self.entries.push(result);
        }
    }

    /// Feed an entire raw result sequence through [`Self::record`] in order.
    pub fn extend(&mut self, results: impl IntoIterator<Item = KipResult>, run_verbosity: u8) {
        for result in results {
            self.record(result, run_verbosity);
        }
    }

    pub fn entries(&self) -> &[KipResult] {
        &self.entries
    }

    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|r| r.success)
    }
}
