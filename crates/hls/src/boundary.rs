//! Segment boundary decisions, grounded on `SrsHlsMuxer`/`SrsHlsController`
//! in `srs_app_hls.hpp`: whether the current segment has run long enough
//! to close (`is_segment_overflow`), whether a pure-audio stream without
//! keyframes needs a harder cutoff (`is_segment_absolutely_overflow`),
//! whether to hold the cut until the next keyframe (`wait_keyframe`), and
//! the floor-timestamp duplicate/jump detection used when `ts_floor` is
//! enabled.

use std::time::Duration;

use streamcfg::HlsConfig;

/// Tracks one open segment's accumulated duration and, when `ts_floor`
/// is enabled, the floor timestamp bookkeeping needed to reject
/// duplicate or backward-jumping reap points.
pub struct SegmentClock {
    config: HlsConfig,
    segment_start_dts: Option<i64>,
    last_dts: i64,
    previous_floor_ts: Option<i64>,
    accept_floor_ts: Option<i64>,
}

impl SegmentClock {
    pub fn new(config: HlsConfig) -> Self {
        SegmentClock {
            config,
            segment_start_dts: None,
            last_dts: 0,
            previous_floor_ts: None,
            accept_floor_ts: None,
        }
    }

    /// Record a packet's dts (milliseconds) arriving on the current
    /// segment. Starts the clock on the first packet after a reap.
    pub fn observe(&mut self, dts: i64) {
        if self.segment_start_dts.is_none() {
            self.segment_start_dts = Some(dts);
        }
        self.last_dts = dts;
    }

    fn duration(&self) -> Duration {
        match self.segment_start_dts {
            Some(start) => Duration::from_millis(self.last_dts.saturating_sub(start).max(0) as u64),
            None => Duration::ZERO,
        }
    }

    /// Whether the current segment has reached its configured fragment
    /// length.
    pub fn is_segment_overflow(&self) -> bool {
        self.duration() >= self.config.fragment
    }

    /// For pure-audio streams there's no keyframe to cue a cut on, so a
    /// segment is force-closed once it's run to `aof_ratio` times the
    /// configured fragment length, rather than waiting indefinitely.
    pub fn is_segment_absolutely_overflow(&self) -> bool {
        let limit = self.config.fragment.mul_f64(self.config.aof_ratio);
        self.duration() >= limit
    }

    /// Reset bookkeeping for the segment that just opened.
    pub fn reap(&mut self) {
        self.segment_start_dts = None;
    }

    /// `ts_floor` duplicate/jump detection: `floor_ts` is the dts rounded
    /// down to a fragment-length boundary. Returns `true` if this floor
    /// value should be accepted as a new reap point (i.e. it's strictly
    /// greater than the last accepted one), `false` if it's a duplicate
    /// or backward jump that should be ignored.
    pub fn accept_floor(&mut self, dts: i64) -> bool {
        let fragment_ms = self.config.fragment.as_millis().max(1) as i64;
        let floor_ts = dts - (dts % fragment_ms);

        if let Some(previous) = self.previous_floor_ts {
            if floor_ts <= previous {
                return false;
            }
        }
        self.previous_floor_ts = Some(floor_ts);
        self.accept_floor_ts = Some(floor_ts);
        true
    }

    pub fn accept_floor_ts(&self) -> Option<i64> {
        self.accept_floor_ts
    }
}

/// Decide whether a segment should close now, given the current clock,
/// whether the incoming packet is a keyframe, and whether the stream has
/// carried any video at all (pure audio skips the keyframe wait).
pub fn should_reap(clock: &SegmentClock, config: &HlsConfig, is_keyframe: bool, pure_audio: bool) -> bool {
    if pure_audio {
        return clock.is_segment_absolutely_overflow() || (clock.is_segment_overflow() && is_keyframe);
    }
    if !clock.is_segment_overflow() {
        return false;
    }
    if config.wait_keyframe {
        is_keyframe
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HlsConfig {
        let mut c = HlsConfig::default();
        c.fragment = Duration::from_secs(5);
        c.aof_ratio = 2.0;
        c
    }

    #[test]
    fn no_overflow_before_fragment_length() {
        let mut clock = SegmentClock::new(config());
        clock.observe(0);
        clock.observe(3_000);
        assert!(!clock.is_segment_overflow());
    }

    #[test]
    fn overflows_once_fragment_length_elapses() {
        let mut clock = SegmentClock::new(config());
        clock.observe(0);
        clock.observe(5_001);
        assert!(clock.is_segment_overflow());
    }

    #[test]
    fn video_stream_waits_for_keyframe_when_configured() {
        let mut cfg = config();
        cfg.wait_keyframe = true;
        let mut clock = SegmentClock::new(cfg.clone());
        clock.observe(0);
        clock.observe(6_000);
        assert!(!should_reap(&clock, &cfg, false, false));
        assert!(should_reap(&clock, &cfg, true, false));
    }

    #[test]
    fn pure_audio_reaps_on_absolute_overflow_without_keyframe() {
        let cfg = config();
        let mut clock = SegmentClock::new(cfg.clone());
        clock.observe(0);
        clock.observe(10_001); // 2x fragment
        assert!(should_reap(&clock, &cfg, false, true));
    }

    #[test]
    fn reap_resets_segment_start() {
        let mut clock = SegmentClock::new(config());
        clock.observe(0);
        clock.observe(6_000);
        assert!(clock.is_segment_overflow());
        clock.reap();
        clock.observe(6_100);
        assert!(!clock.is_segment_overflow());
    }

    #[test]
    fn floor_rejects_duplicate_and_backward_timestamps() {
        let mut clock = SegmentClock::new(config());
        assert!(clock.accept_floor(5_200)); // floors to 5000
        assert!(!clock.accept_floor(5_999)); // same floor bucket, duplicate
        assert!(!clock.accept_floor(3_000)); // backward jump
        assert!(clock.accept_floor(10_500)); // next bucket
        assert_eq!(clock.accept_floor_ts(), Some(10_000));
    }
}
