//! Engine-wide configuration read from environment variables (spec §6).

/// The five scheduler/archive knobs the engine reads from the process
/// environment at startup, each clamped to its documented range.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub node_max_retries: u32,
    pub node_timeout_ms: u64,
    pub max_concurrent_branches: usize,
    pub max_persisted_runs: usize,
    pub run_stuck_threshold_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_max_retries: 3,
            node_timeout_ms: 600_000,
            max_concurrent_branches: 8,
            max_persisted_runs: 200,
            run_stuck_threshold_ms: 300_000,
        }
    }
}

fn env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).map(|v| v.clamp(min, max)).unwrap_or(default)
}

fn env_i64(key: &str, default: i64, min: i64, max: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok()).map(|v| v.clamp(min, max)).unwrap_or(default)
}

impl EngineConfig {
    /// Read every knob from the environment, falling back to the
    /// documented default when unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node_max_retries: env_u64("WORKFLOW_NODE_MAX_RETRIES", u64::from(defaults.node_max_retries), 0, 20) as u32,
            node_timeout_ms: env_u64("WORKFLOW_NODE_TIMEOUT_MS", defaults.node_timeout_ms, 1_000, 21_600_000),
            max_concurrent_branches: env_u64("WORKFLOW_MAX_CONCURRENT_BRANCHES", defaults.max_concurrent_branches as u64, 1, 64) as usize,
            max_persisted_runs: env_u64("WORKFLOW_MAX_PERSISTED_RUNS", defaults.max_persisted_runs as u64, 20, 5000) as usize,
            run_stuck_threshold_ms: env_i64("WORKFLOW_RUN_STUCK_THRESHOLD_MS", defaults.run_stuck_threshold_ms, 10_000, 7_200_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.node_max_retries, 3);
        assert_eq!(config.node_timeout_ms, 600_000);
        assert_eq!(config.max_concurrent_branches, 8);
        assert_eq!(config.max_persisted_runs, 200);
        assert_eq!(config.run_stuck_threshold_ms, 300_000);
    }

    #[test]
    fn env_u64_clamps_out_of_range() {
        assert_eq!(env_u64("FLEET_ENGINE_TEST_DOES_NOT_EXIST", 5, 1, 64), 5);
    }
}
