//! Pithy-print: log-throttling so identical recurring errors print at a
//! bounded cadence regardless of event rate.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-site gate: the first occurrence always prints, after which a site
/// is silenced until `interval` has elapsed, at which point the next
/// occurrence prints again and carries a `suppressed` count of how many
/// were dropped in between.
pub struct PithyPrint {
    interval: Duration,
    sites: HashMap<String, SiteState>,
}

struct SiteState {
    last_emit: Instant,
    suppressed: u64,
}

/// Outcome of `PithyPrint::gate`: either emit now (with the number of
/// calls suppressed since the last emission) or stay silent.
pub enum Gate {
    Emit { suppressed: u64 },
    Suppress,
}

impl PithyPrint {
    pub fn new(interval: Duration) -> Self {
        PithyPrint {
            interval,
            sites: HashMap::new(),
        }
    }

    pub fn gate(&mut self, site: &str) -> Gate {
        let now = Instant::now();
        match self.sites.get_mut(site) {
            None => {
                self.sites.insert(
                    site.to_string(),
                    SiteState {
                        last_emit: now,
                        suppressed: 0,
                    },
                );
                Gate::Emit { suppressed: 0 }
            }
            Some(state) if now.duration_since(state.last_emit) >= self.interval => {
                let suppressed = state.suppressed;
                state.last_emit = now;
                state.suppressed = 0;
                Gate::Emit { suppressed }
            }
            Some(state) => {
                state.suppressed += 1;
                Gate::Suppress
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_emits() {
        let mut p = PithyPrint::new(Duration::from_secs(60));
        assert!(matches!(p.gate("a"), Gate::Emit { suppressed: 0 }));
    }

    #[test]
    fn subsequent_calls_within_interval_are_suppressed() {
        let mut p = PithyPrint::new(Duration::from_secs(60));
        p.gate("a");
        assert!(matches!(p.gate("a"), Gate::Suppress));
        assert!(matches!(p.gate("a"), Gate::Suppress));
    }

    #[test]
    fn different_sites_are_independent() {
        let mut p = PithyPrint::new(Duration::from_secs(60));
        p.gate("a");
        assert!(matches!(p.gate("b"), Gate::Emit { suppressed: 0 }));
    }

    #[test]
    fn emits_after_interval_elapses_with_suppressed_count() {
        let mut p = PithyPrint::new(Duration::from_millis(10));
        p.gate("a");
        p.gate("a");
        p.gate("a");
        std::thread::sleep(Duration::from_millis(15));
        match p.gate("a") {
            Gate::Emit { suppressed } => assert_eq!(suppressed, 2),
            Gate::Suppress => panic!("expected emit after interval elapsed"),
        }
    }
}
