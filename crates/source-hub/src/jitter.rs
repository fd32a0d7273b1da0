//! Publisher-clock jitter correction applied to incoming dts before a
//! packet is cached or dispatched (SPEC_FULL §4.2, resolved from
//! `srs_utility.cpp`'s `SrsRtmpJitterAlgorithm`): a republishing or
//! reconnecting source can present timestamps that jump backwards or
//! leap forward, which would otherwise desync every consumer's player.

use streamcfg::JitterAlgorithm;

const MAX_JITTER_MS: i64 = 250;
const DEFAULT_FRAME_STEP_MS: i64 = 10;

/// Per-source jitter corrector; one instance lives alongside each
/// `Source`, fed every packet's raw dts in arrival order.
pub struct JitterCorrector {
    algorithm: JitterAlgorithm,
    last_raw_dts: Option<i64>,
    last_corrected_dts: i64,
}

impl JitterCorrector {
    pub fn new(algorithm: JitterAlgorithm) -> Self {
        JitterCorrector {
            algorithm,
            last_raw_dts: None,
            last_corrected_dts: 0,
        }
    }

    /// Correct a raw dts, returning the value to stamp on the outgoing
    /// packet. Must be called once per packet, in arrival order.
    pub fn correct(&mut self, raw_dts: i64) -> i64 {
        let corrected = match self.algorithm {
            JitterAlgorithm::Off => raw_dts,
            JitterAlgorithm::Zero => {
                let step = match self.last_raw_dts {
                    Some(prev) if raw_dts > prev => DEFAULT_FRAME_STEP_MS,
                    _ => DEFAULT_FRAME_STEP_MS,
                };
                let next = self.last_corrected_dts + step.max(0);
                next
            }
            JitterAlgorithm::Full => match self.last_raw_dts {
                None => self.last_corrected_dts,
                Some(prev) => {
                    let delta = raw_dts - prev;
                    if delta < 0 || delta > MAX_JITTER_MS {
                        self.last_corrected_dts + DEFAULT_FRAME_STEP_MS
                    } else {
                        self.last_corrected_dts + delta
                    }
                }
            },
        };
        self.last_raw_dts = Some(raw_dts);
        self.last_corrected_dts = corrected;
        corrected
    }
}
