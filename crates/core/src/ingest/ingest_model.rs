use serde::{Deserialize, Serialize};

use crate::positions::ResolutionCounts;

/// What a store did with one resolved holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Added,
    /// Same key already held; quantity and market data were refreshed.
    Merged,
}

/// Summary of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub accounts: usize,
    pub added: usize,
    pub merged: usize,
    pub deactivated: usize,
    pub cash_lines: usize,
    pub counts: ResolutionCounts,
}

impl IngestReport {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Added => self.added += 1,
            UpsertOutcome::Merged => self.merged += 1,
        }
    }
}
