//! Circuit breaker for payout submission
//!
//! One circuit per treasury address. When the signing relay keeps failing
//! for a treasury, further executes fast-fail instead of each waiting out
//! the submission timeout.
//!
//! ## Transitions
//! - Closed → Open: after `failure_threshold` consecutive failures
//! - Open → HalfOpen: once `reset_timeout` has passed since the last failure
//! - HalfOpen → Closed: after `success_threshold` consecutive successes
//! - HalfOpen → Open: on any failure

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker configuration
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time after the last failure before a trial payout is let through
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_state_change: Instant::now(),
        }
    }

    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.success_count = 0;
        self.last_state_change = Instant::now();
    }
}

/// Tracks payout health per treasury address
#[derive(Debug)]
pub struct TreasuryCircuits {
    circuits: RwLock<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl TreasuryCircuits {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether a payout from `treasury` may be attempted now
    pub fn check(&self, treasury: &str) -> Result<(), CircuitOpenError> {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(treasury.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let retry_in = circuit
                    .last_failure_time
                    .map(|t| self.config.reset_timeout.saturating_sub(t.elapsed()));

                if retry_in == Some(Duration::ZERO) {
                    info!(treasury = %treasury, "Payout circuit half-open, allowing trial");
                    circuit.transition(CircuitState::HalfOpen);
                    return Ok(());
                }
                Err(CircuitOpenError {
                    treasury: treasury.to_string(),
                    time_until_retry: retry_in,
                })
            }
        }
    }

    pub fn record_success(&self, treasury: &str) {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(treasury.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.success_count += 1;
                if circuit.success_count >= self.config.success_threshold {
                    info!(treasury = %treasury, "Payout circuit closed");
                    circuit.transition(CircuitState::Closed);
                    circuit.failure_count = 0;
                } else {
                    debug!(
                        treasury = %treasury,
                        successes = circuit.success_count,
                        threshold = self.config.success_threshold,
                        "Half-open payout succeeded"
                    );
                }
            }
            CircuitState::Closed | CircuitState::Open => {
                circuit.failure_count = 0;
            }
        }
    }

    pub fn record_failure(&self, treasury: &str) {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(treasury.to_string())
            .or_insert_with(Circuit::new);

        circuit.last_failure_time = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count += 1;
                if circuit.failure_count >= self.config.failure_threshold {
                    warn!(
                        treasury = %treasury,
                        failures = circuit.failure_count,
                        "Payout circuit opened"
                    );
                    circuit.transition(CircuitState::Open);
                } else {
                    debug!(
                        treasury = %treasury,
                        failures = circuit.failure_count,
                        threshold = self.config.failure_threshold,
                        "Payout failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(treasury = %treasury, "Trial payout failed, circuit reopened");
                circuit.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, treasury: &str) -> CircuitState {
        self.circuits
            .read()
            .get(treasury)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn stats(&self) -> Vec<CircuitStats> {
        self.circuits
            .read()
            .iter()
            .map(|(treasury, c)| CircuitStats {
                treasury: treasury.clone(),
                state: c.state,
                failure_count: c.failure_count,
                success_count: c.success_count,
                time_in_state: c.last_state_change.elapsed(),
            })
            .collect()
    }
}

impl Default for TreasuryCircuits {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Payout refused because the treasury's circuit is open
#[derive(Debug, Clone)]
pub struct CircuitOpenError {
    pub treasury: String,
    pub time_until_retry: Option<Duration>,
}

impl std::fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "payouts from {} are suspended after repeated failures", self.treasury)?;
        match self.time_until_retry {
            Some(d) => write!(f, ", retry in {:.1}s", d.as_secs_f64()),
            None => Ok(()),
        }
    }
}

impl std::error::Error for CircuitOpenError {}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub treasury: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    #[serde(skip)]
    pub time_in_state: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TREASURY: &str = "addr_test1qtreasury";

    fn circuits(failures: u32, reset: Duration, successes: u32) -> TreasuryCircuits {
        TreasuryCircuits::new(CircuitBreakerConfig {
            failure_threshold: failures,
            reset_timeout: reset,
            success_threshold: successes,
        })
    }

    #[test]
    fn test_unknown_treasury_is_closed() {
        let c = TreasuryCircuits::default();
        assert_eq!(c.state(TREASURY), CircuitState::Closed);
        assert!(c.check(TREASURY).is_ok());
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let c = circuits(3, Duration::from_secs(30), 2);

        c.record_failure(TREASURY);
        c.record_failure(TREASURY);
        assert!(c.check(TREASURY).is_ok());

        c.record_failure(TREASURY);
        assert_eq!(c.state(TREASURY), CircuitState::Open);
        let err = c.check(TREASURY).unwrap_err();
        assert_eq!(err.treasury, TREASURY);
        assert!(err.to_string().contains("retry in"));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let c = circuits(3, Duration::from_secs(30), 2);

        c.record_failure(TREASURY);
        c.record_failure(TREASURY);
        c.record_success(TREASURY);
        c.record_failure(TREASURY);
        c.record_failure(TREASURY);

        assert_eq!(c.state(TREASURY), CircuitState::Closed);
    }

    #[test]
    fn test_circuits_are_per_treasury() {
        let c = circuits(1, Duration::from_secs(30), 1);
        c.record_failure(TREASURY);

        assert!(c.check(TREASURY).is_err());
        assert!(c.check("addr_test1qother").is_ok());
    }

    #[test]
    fn test_half_open_then_closed() {
        let c = circuits(1, Duration::from_millis(10), 2);

        c.record_failure(TREASURY);
        sleep(Duration::from_millis(20));
        c.check(TREASURY).unwrap();
        assert_eq!(c.state(TREASURY), CircuitState::HalfOpen);

        c.record_success(TREASURY);
        assert_eq!(c.state(TREASURY), CircuitState::HalfOpen);
        c.record_success(TREASURY);
        assert_eq!(c.state(TREASURY), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let c = circuits(1, Duration::from_millis(10), 2);

        c.record_failure(TREASURY);
        sleep(Duration::from_millis(20));
        c.check(TREASURY).unwrap();

        c.record_failure(TREASURY);
        assert_eq!(c.state(TREASURY), CircuitState::Open);
    }

    #[test]
    fn test_stats_per_treasury() {
        let c = circuits(1, Duration::from_secs(300), 1);
        c.record_failure(TREASURY);
        c.record_success("addr_test1qother");

        let mut stats = c.stats();
        stats.sort_by(|a, b| a.treasury.cmp(&b.treasury));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].treasury, "addr_test1qother");
        assert_eq!(stats[0].state, CircuitState::Closed);
        assert_eq!(stats[1].state, CircuitState::Open);
        assert_eq!(stats[1].failure_count, 1);
    }
}
