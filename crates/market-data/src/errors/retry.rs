/// Classification of provider failures.
///
/// The aggregator never retries a provider within one query; it always asks
/// every provider once and treats failures as missing data. The class only
/// controls circuit breaker accounting.
///
/// | Class | Record Circuit Breaker Failure? |
/// |-------|--------------------------------|
/// | `Never` | No |
/// | `FailoverWithPenalty` | Yes |
/// | `NextProvider` | No |
/// | `CircuitOpen` | No (already open) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The provider answered definitively (e.g. unknown security).
    Never,

    /// Transient failure such as 429, timeout or transport error.
    /// Counts against the provider so a persistently failing host gets skipped.
    FailoverWithPenalty,

    /// The provider could not serve this request but is otherwise healthy.
    NextProvider,

    /// The provider was skipped because its circuit is open.
    CircuitOpen,
}

impl RetryClass {
    /// Whether this failure should be recorded by the circuit breaker.
    pub fn penalizes(self) -> bool {
        matches!(self, Self::FailoverWithPenalty)
    }
}
