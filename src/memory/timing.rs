//! Bandwidth-based latency model.
//!
//! Every admitted request draws on one shared bandwidth budget: a transfer
//! of `n` bytes completes in `ceil(n / bandwidth)` cycles. That single law
//! is the whole timing model; there are no per-phase setup overheads.

use crate::config::Config;

/// Default bandwidth when neither caller nor configuration says otherwise.
pub const DEFAULT_BANDWIDTH_BYTES_PER_CYCLE: u64 = 8;

/// Timing configuration for a chunk memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemTimingConfig {
    /// Bytes the memory can move per cycle.
    pub bandwidth_bytes_per_cycle: u64,
}

impl Default for MemTimingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BANDWIDTH_BYTES_PER_CYCLE)
    }
}

impl MemTimingConfig {
    /// Create a config with an explicit bandwidth.
    pub fn new(bandwidth_bytes_per_cycle: u64) -> Self {
        assert!(
            bandwidth_bytes_per_cycle > 0,
            "memory bandwidth must be nonzero"
        );
        MemTimingConfig {
            bandwidth_bytes_per_cycle,
        }
    }

    /// Create a config from the crate configuration (environment, config
    /// files, then built-in defaults).
    pub fn from_config() -> Self {
        let config = Config::get();
        if config.instant_memory_timing() {
            return Self::instant();
        }
        Self::new(config.bandwidth_bytes_per_cycle())
    }

    /// Effectively unbounded bandwidth: every nonempty transfer collapses
    /// to a single cycle.
    pub fn instant() -> Self {
        MemTimingConfig {
            bandwidth_bytes_per_cycle: u64::MAX,
        }
    }

    /// Completion latency in cycles for a transfer of `bytes` bytes.
    pub fn latency_cycles(&self, bytes: u64) -> u64 {
        if bytes == 0 {
            return 0;
        }
        (bytes + self.bandwidth_bytes_per_cycle - 1) / self.bandwidth_bytes_per_cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_rounds_up() {
        let timing = MemTimingConfig::new(4);
        assert_eq!(timing.latency_cycles(1), 1);
        assert_eq!(timing.latency_cycles(4), 1);
        assert_eq!(timing.latency_cycles(5), 2);
        assert_eq!(timing.latency_cycles(16), 4);
        assert_eq!(timing.latency_cycles(0), 0);
    }

    #[test]
    fn test_instant_collapses_to_one_cycle() {
        let timing = MemTimingConfig::instant();
        assert_eq!(timing.latency_cycles(1), 1);
        assert_eq!(timing.latency_cycles(1 << 40), 1);
    }

    #[test]
    #[should_panic(expected = "bandwidth must be nonzero")]
    fn test_zero_bandwidth_is_fatal() {
        let _ = MemTimingConfig::new(0);
    }
}
