//! Per-provider circuit breaker.
//!
//! A provider that keeps timing out or rate limiting is skipped for a while
//! instead of costing every query a full timeout. Three states:
//!
//! - **Closed**: requests go through.
//! - **Open**: requests are skipped until the recovery timeout elapses.
//! - **HalfOpen**: requests go through; successes close, a failure reopens.
//!
//! State is in-memory for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::cache::{Clock, SystemClock};

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<DateTime<Utc>>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive penalized failures before opening.
    pub failure_threshold: u32,
    /// Time spent Open before letting a test request through.
    pub recovery_timeout: Duration,
    /// Successes needed in HalfOpen to close again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Lock the circuits, recovering from poison: a slightly wrong circuit
    /// state is preferable to a panic.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a request to `provider` may go out now.
    ///
    /// Moves Open -> HalfOpen once the recovery timeout has elapsed.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = circuit.last_failure.is_some_and(|last| {
                    (now - last)
                        .to_std()
                        .is_ok_and(|elapsed| elapsed >= self.config.recovery_timeout)
                });
                if recovered {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                }
                recovered
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.half_open_success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} successes",
                        provider, circuit.half_open_successes
                    );
                    *circuit = Circuit::new();
                }
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: late success for '{}' while Open",
                    provider
                );
            }
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.failure_count += 1;
        circuit.last_failure = Some(now);

        match circuit.state {
            CircuitState::Closed if circuit.failure_count >= self.config.failure_threshold => {
                info!(
                    "Circuit breaker: opening circuit for '{}' after {} failures",
                    provider, circuit.failure_count
                );
                circuit.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                debug!(
                    "Circuit breaker: failure for '{}' ({}/{})",
                    provider, circuit.failure_count, self.config.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failure in HalfOpen",
                    provider
                );
                circuit.state = CircuitState::Open;
                circuit.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset_all(&self) {
        self.lock_circuits().clear();
        info!("Circuit breaker: all circuits reset");
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), Arc::new(SystemClock))
    }
}
