//! Engine configuration

use crate::circuit_breaker::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How many approvals a proposal needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Current leader count, re-read at every approval and execute
    #[default]
    Floating,
    /// Leader count captured when the proposal is submitted
    FixedAtCreation,
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPolicy::Floating => f.write_str("floating"),
            ThresholdPolicy::FixedAtCreation => f.write_str("fixed_at_creation"),
        }
    }
}

impl FromStr for ThresholdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "floating" => Ok(ThresholdPolicy::Floating),
            "fixed_at_creation" | "fixed" => Ok(ThresholdPolicy::FixedAtCreation),
            other => Err(format!("unknown threshold policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one chain submission
    pub submit_timeout: Duration,
    pub threshold_policy: ThresholdPolicy,
    pub circuit: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(60),
            threshold_policy: ThresholdPolicy::Floating,
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("floating".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::Floating);
        assert_eq!(
            "fixed-at-creation".parse::<ThresholdPolicy>().unwrap(),
            ThresholdPolicy::FixedAtCreation
        );
        assert_eq!(
            ThresholdPolicy::FixedAtCreation.to_string().parse::<ThresholdPolicy>().unwrap(),
            ThresholdPolicy::FixedAtCreation
        );
        assert!("majority".parse::<ThresholdPolicy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.submit_timeout, Duration::from_secs(60));
        assert_eq!(config.threshold_policy, ThresholdPolicy::Floating);
        assert_eq!(config.circuit.failure_threshold, 5);
    }
}
