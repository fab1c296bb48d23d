//! Per-source circuit breaker for the validation cycle.
//!
//! Tracks consecutive inconclusive probes per source and stops probing a
//! source that keeps failing. Cooldown is counted in validation cycles, not
//! wall-clock time, so it follows the scrape interval.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N unknowns   ┌────────┐  M cycles   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  definitive result      │  unknown             │
//!     └─────────────────────────┴──────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use crate::check::ProbeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    /// Skipped; `remaining_cycles` further cycles are skipped before half-open.
    Open { remaining_cycles: u32 },
    HalfOpen,
}

#[derive(Debug, Clone)]
struct SourceHealth {
    state: BreakerState,
    consecutive_unknowns: u32,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_unknowns: 0,
        }
    }
}

#[derive(Debug)]
pub struct SourceBreaker {
    threshold: u32,
    cooldown_cycles: u32,
    sources: Mutex<HashMap<String, SourceHealth>>,
}

impl SourceBreaker {
    #[must_use]
    pub fn new(threshold: u32, cooldown_cycles: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown_cycles,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Advance cooldowns at the start of a validation cycle.
    pub fn begin_cycle(&self) {
        let mut sources = self.lock();
        for (source, health) in sources.iter_mut() {
            if let BreakerState::Open { remaining_cycles } = health.state {
                health.state = if remaining_cycles == 0 {
                    tracing::info!(source = %source, "validate: breaker half-open, probing source again");
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open {
                        remaining_cycles: remaining_cycles - 1,
                    }
                };
            }
        }
    }

    /// Whether coupons from `source` may be probed right now.
    #[must_use]
    pub fn allows(&self, source: &str) -> bool {
        !matches!(
            self.lock().get(source).map(|h| h.state),
            Some(BreakerState::Open { .. })
        )
    }

    /// Feed a probe outcome back. Returns `true` if this call tripped the breaker.
    pub fn record(&self, source: &str, outcome: ProbeOutcome) -> bool {
        let mut sources = self.lock();
        let health = sources.entry(source.to_string()).or_default();

        match outcome {
            ProbeOutcome::Valid | ProbeOutcome::Invalid => {
                health.state = BreakerState::Closed;
                health.consecutive_unknowns = 0;
                false
            }
            ProbeOutcome::Unknown => {
                health.consecutive_unknowns = health.consecutive_unknowns.saturating_add(1);
                let trip = match health.state {
                    BreakerState::HalfOpen => true,
                    BreakerState::Closed => health.consecutive_unknowns >= self.threshold,
                    BreakerState::Open { .. } => false,
                };
                if trip {
                    health.state = BreakerState::Open {
                        remaining_cycles: self.cooldown_cycles,
                    };
                    tracing::warn!(
                        source = %source,
                        consecutive_unknowns = health.consecutive_unknowns,
                        cooldown_cycles = self.cooldown_cycles,
                        "validate: breaker tripped, skipping source"
                    );
                }
                trip
            }
        }
    }

    #[must_use]
    pub fn state(&self, source: &str) -> BreakerState {
        self.lock()
            .get(source)
            .map_or(BreakerState::Closed, |h| h.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SourceHealth>> {
        // A panic while holding the lock leaves plain counters behind; keep going.
        self.sources
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(breaker: &SourceBreaker, source: &str, n: u32) {
        for _ in 0..n {
            breaker.record(source, ProbeOutcome::Unknown);
        }
    }

    #[test]
    fn unknown_source_is_closed() {
        let breaker = SourceBreaker::new(3, 2);
        assert_eq!(breaker.state("warp"), BreakerState::Closed);
        assert!(breaker.allows("warp"));
    }

    #[test]
    fn trips_after_threshold_consecutive_unknowns() {
        let breaker = SourceBreaker::new(3, 2);
        assert!(!breaker.record("warp", ProbeOutcome::Unknown));
        assert!(!breaker.record("warp", ProbeOutcome::Unknown));
        assert!(breaker.record("warp", ProbeOutcome::Unknown));
        assert!(!breaker.allows("warp"));
        assert!(breaker.allows("tabnine"), "other sources are unaffected");
    }

    #[test]
    fn definitive_result_resets_the_count() {
        let breaker = SourceBreaker::new(3, 2);
        trip(&breaker, "warp", 2);
        breaker.record("warp", ProbeOutcome::Invalid);
        trip(&breaker, "warp", 2);
        assert!(breaker.allows("warp"));
    }

    #[test]
    fn stays_open_for_cooldown_cycles_then_half_opens() {
        let breaker = SourceBreaker::new(1, 2);
        trip(&breaker, "warp", 1);

        breaker.begin_cycle();
        assert!(!breaker.allows("warp"), "first cooldown cycle");
        breaker.begin_cycle();
        assert!(!breaker.allows("warp"), "second cooldown cycle");
        breaker.begin_cycle();
        assert_eq!(breaker.state("warp"), BreakerState::HalfOpen);
        assert!(breaker.allows("warp"));
    }

    #[test]
    fn half_open_failure_retrips_immediately() {
        let breaker = SourceBreaker::new(5, 0);
        trip(&breaker, "warp", 5);
        breaker.begin_cycle();
        assert_eq!(breaker.state("warp"), BreakerState::HalfOpen);

        assert!(breaker.record("warp", ProbeOutcome::Unknown));
        assert_eq!(
            breaker.state("warp"),
            BreakerState::Open {
                remaining_cycles: 0
            }
        );
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = SourceBreaker::new(1, 0);
        trip(&breaker, "warp", 1);
        breaker.begin_cycle();

        breaker.record("warp", ProbeOutcome::Valid);
        assert_eq!(breaker.state("warp"), BreakerState::Closed);
    }
}
