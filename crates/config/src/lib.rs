//! In-memory configuration surface for the media routing core.
//!
//! Parsing an on-disk config file format (and hot reload of it) is out of
//! scope for this crate: it defines the fields every other crate reads
//! and an env-based loader good enough for tests and the CLI's `-t`
//! (validate and exit) mode.

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Consumer FIFO overflow policy (SPEC_FULL §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    DropOldest,
    DisconnectSubscriber,
}

/// Jitter correction algorithm applied to a consumer's dts stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterAlgorithm {
    Full,
    Zero,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Frames retained in the GOP cache (0 disables GOP caching).
    #[serde(default = "default_gop_cache_frames")]
    pub gop_cache_frames: usize,
    /// Maximum items buffered per consumer before `overflow_policy` kicks in.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    #[serde(default = "default_overflow_policy")]
    pub overflow_policy: OverflowPolicy,
    #[serde(default = "default_jitter_algorithm")]
    pub jitter_algorithm: JitterAlgorithm,
    /// Grace window before disposing a source with no publisher/consumers.
    #[serde(default = "default_grace_window", with = "duration_secs")]
    pub grace_window: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            gop_cache_frames: default_gop_cache_frames(),
            queue_length: default_queue_length(),
            overflow_policy: default_overflow_policy(),
            jitter_algorithm: default_jitter_algorithm(),
            grace_window: default_grace_window(),
        }
    }
}

fn default_gop_cache_frames() -> usize {
    256
}
fn default_queue_length() -> usize {
    512
}
fn default_overflow_policy() -> OverflowPolicy {
    OverflowPolicy::DropOldest
}
fn default_jitter_algorithm() -> JitterAlgorithm {
    JitterAlgorithm::Full
}
fn default_grace_window() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_first_packet_timeout", with = "duration_secs")]
    pub publish_first_packet: Duration,
    #[serde(default = "default_steady_timeout", with = "duration_secs")]
    pub publish_steady: Duration,
    #[serde(default = "default_stun_timeout", with = "duration_secs")]
    pub ice_stun_timeout: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            publish_first_packet: default_first_packet_timeout(),
            publish_steady: default_steady_timeout(),
            ice_stun_timeout: default_stun_timeout(),
        }
    }
}

fn default_first_packet_timeout() -> Duration {
    Duration::from_secs(20)
}
fn default_steady_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_stun_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HlsConfig {
    #[serde(default = "default_hls_fragment", with = "duration_secs")]
    pub fragment: Duration,
    #[serde(default = "default_hls_window", with = "duration_secs")]
    pub window: Duration,
    #[serde(default = "default_aof_ratio")]
    pub aof_ratio: f64,
    #[serde(default)]
    pub wait_keyframe: bool,
    #[serde(default)]
    pub ts_floor: bool,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_fragments_per_key")]
    pub fragments_per_key: u32,
    #[serde(default)]
    pub fmp4: bool,
}

impl Default for HlsConfig {
    fn default() -> Self {
        HlsConfig {
            fragment: default_hls_fragment(),
            window: default_hls_window(),
            aof_ratio: default_aof_ratio(),
            wait_keyframe: true,
            ts_floor: false,
            encrypt: false,
            fragments_per_key: default_fragments_per_key(),
            fmp4: false,
        }
    }
}

fn default_hls_fragment() -> Duration {
    Duration::from_secs(5)
}
fn default_hls_window() -> Duration {
    Duration::from_secs(30)
}
fn default_aof_ratio() -> f64 {
    2.0
}
fn default_fragments_per_key() -> u32 {
    50
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    pub on_connect: Option<String>,
    pub on_close: Option<String>,
    pub on_publish: Option<String>,
    pub on_unpublish: Option<String>,
    pub on_play: Option<String>,
    pub on_stop: Option<String>,
    pub on_hls: Option<String>,
    pub on_hls_notify: Option<String>,
    pub on_dvr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_rtmp_listen")]
    pub rtmp: String,
    pub rtmps: Option<String>,
    pub srt: Option<String>,
    pub rtsp: Option<String>,
    #[serde(default = "default_http_api_listen")]
    pub http_api: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            rtmp: default_rtmp_listen(),
            rtmps: None,
            srt: None,
            rtsp: None,
            http_api: default_http_api_listen(),
        }
    }
}

fn default_rtmp_listen() -> String {
    "0.0.0.0:1935".to_string()
}
fn default_http_api_listen() -> String {
    "0.0.0.0:1985".to_string()
}

/// Top-level application configuration for `media-server`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub hls: HlsConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory layout base for HLS/DVR output, per SPEC_FULL §6.
    #[serde(default = "default_hls_path")]
    pub hls_path: String,
    #[serde(default = "default_dvr_path")]
    pub dvr_path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_hls_path() -> String {
    "./objs/nginx/html".to_string()
}
fn default_dvr_path() -> String {
    "./objs/nginx/html/dvr".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// documented defaults for anything unset. Used both by the `-c`
    /// startup path (layered over a parsed file, not implemented here)
    /// and by the `-t` validate-and-exit path.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let mut cfg = AppConfig::default();
        if let Ok(v) = env::var("RTMP_LISTEN") {
            cfg.listen.rtmp = v;
        }
        if let Ok(v) = env::var("HTTP_API_LISTEN") {
            cfg.listen.http_api = v;
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Ok(v) = env::var("HLS_PATH") {
            cfg.hls_path = v;
        }
        if let Ok(v) = env::var("DVR_PATH") {
            cfg.dvr_path = v;
        }
        Ok(cfg)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Validate cross-field invariants for the `-t` CLI mode.
    pub fn validate(&self) -> Result<(), String> {
        if self.hls.aof_ratio < 1.0 {
            return Err("hls.aof_ratio must be >= 1.0".to_string());
        }
        if self.source.queue_length == 0 {
            return Err("source.queue_length must be > 0".to_string());
        }
        if self.hls.fragment.is_zero() {
            return Err("hls.fragment must be > 0".to_string());
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.listen.rtmp, "0.0.0.0:1935");
        assert_eq!(cfg.timeouts.publish_first_packet, Duration::from_secs(20));
        assert_eq!(cfg.timeouts.publish_steady, Duration::from_secs(5));
    }

    #[test]
    fn rejects_invalid_aof_ratio() {
        let mut cfg = AppConfig::default();
        cfg.hls.aof_ratio = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_queue_length() {
        let mut cfg = AppConfig::default();
        cfg.source.queue_length = 0;
        assert!(cfg.validate().is_err());
    }
}
