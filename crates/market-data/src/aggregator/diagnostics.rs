//! Per-query record of what each provider did.

use crate::models::ProviderId;

/// Outcome of asking one provider.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    /// Provider returned a snapshot.
    Data,
    /// Provider answered but does not know the security.
    NotFound,
    /// Provider was not asked because its circuit is open.
    CircuitOpen,
    /// Provider did not answer within the timeout.
    TimedOut,
    /// Provider failed.
    Error(String),
}

#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub outcome: AttemptOutcome,
}

#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record(&mut self, provider_id: ProviderId, outcome: AttemptOutcome) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            outcome,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Data => format!("{}: DATA", a.provider_id),
                AttemptOutcome::NotFound => format!("{}: NOT FOUND", a.provider_id),
                AttemptOutcome::CircuitOpen => format!("{}: SKIPPED (circuit open)", a.provider_id),
                AttemptOutcome::TimedOut => format!("{}: TIMEOUT", a.provider_id),
                AttemptOutcome::Error(err) => format!("{}: ERROR ({})", a.provider_id, err),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn has_data(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Data)
    }
}
