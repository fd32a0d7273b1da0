//! Drives one stream's HLS output: pulls FLV-shaped packets off a
//! `Source` consumer, decides segment boundaries with [`SegmentClock`],
//! muxes either TS or fMP4 segments, rewrites the playlist atomically,
//! and fires the `on_hls` hook — grounded on `SrsHls`/`SrsHlsController`
//! in `srs_app_hls.hpp`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use proto_types::{CoreError, CoreResult, HookAction, HookPayload, MediaKind, MediaPacket, StreamUrl};
use source_hub::{MediaItem, Source};
use streamcfg::HlsConfig;
use tracing::{debug, info};

use admission::HookClient;

use crate::boundary::{should_reap, SegmentClock};
use crate::crypto::KeyRotation;
use crate::fmp4;
use crate::playlist::{self, PlaylistSegment, SegmentWindow};
use crate::ts::TsSegmentWriter;

pub struct HlsSession {
    url: StreamUrl,
    config: HlsConfig,
    output_dir: PathBuf,
    hooks: Arc<HookClient>,
    clock: SegmentClock,
    window: SegmentWindow,
    key_rotation: Option<KeyRotation>,
    sequence_no: u64,
    pending_ts: TsSegmentWriter,
    pending_fmp4: Vec<MediaPacket>,
    saw_video: bool,
    saw_audio: bool,
    has_pending_packets: bool,
}

impl HlsSession {
    pub fn new(url: StreamUrl, config: HlsConfig, output_root: &str, hooks: Arc<HookClient>) -> Self {
        let output_dir = Path::new(output_root).join(&url.app).join(&url.stream);
        let key_rotation = config.encrypt.then(|| KeyRotation::new(config.fragments_per_key));
        HlsSession {
            url,
            window: SegmentWindow::new(config.window.as_secs_f64()),
            clock: SegmentClock::new(config.clone()),
            config,
            output_dir,
            hooks,
            key_rotation,
            sequence_no: 0,
            pending_ts: TsSegmentWriter::new(),
            pending_fmp4: Vec::new(),
            saw_video: false,
            saw_audio: false,
            has_pending_packets: false,
        }
    }

    /// Drain `source`'s consumer until it closes, writing segments as
    /// boundaries are crossed.
    pub async fn run(&mut self, source: &Arc<Source>) -> CoreResult<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| CoreError::Resource(err.to_string()))?;

        let consumer = source.create_consumer();
        loop {
            let item = match consumer.recv().await {
                Ok(item) => item,
                Err(_closed) => break,
            };
            let MediaItem::Flv(packet) = item else { continue };
            self.ingest(packet).await?;
        }
        if self.has_pending_packets {
            self.reap().await?;
        }
        Ok(())
    }

    async fn ingest(&mut self, packet: MediaPacket) -> CoreResult<()> {
        match packet.kind {
            MediaKind::Video => self.saw_video = true,
            MediaKind::Audio => self.saw_audio = true,
            MediaKind::Script => {}
        }
        if packet.is_sequence_header() {
            self.push_packet(packet);
            return Ok(());
        }

        self.clock.observe(packet.dts);
        let is_keyframe = packet.is_keyframe();
        let pure_audio = !self.saw_video;

        if should_reap(&self.clock, &self.config, is_keyframe, pure_audio) {
            self.reap().await?;
        }
        self.push_packet(packet);
        Ok(())
    }

    fn push_packet(&mut self, packet: MediaPacket) {
        self.has_pending_packets = true;
        if self.config.fmp4 {
            self.pending_fmp4.push(packet);
        } else {
            self.pending_ts.write_packet(&packet);
        }
    }

    async fn reap(&mut self) -> CoreResult<()> {
        let seq = self.sequence_no;
        self.sequence_no += 1;

        let (uri, key, key_uri) = if self.config.fmp4 {
            self.write_fmp4_segment(seq).await?
        } else {
            self.write_ts_segment(seq).await?
        };

        let duration_secs = self.config.fragment.as_secs_f64();
        self.window.push(PlaylistSegment {
            uri,
            duration: duration_secs,
            discontinuity: false,
            key,
            key_uri,
        });
        self.clock.reap();
        self.has_pending_packets = false;

        let playlist_text = playlist::render(&self.window);
        let playlist_path = self.output_dir.join("index.m3u8");
        playlist::write_atomic(&playlist_path, playlist_text.as_bytes())
            .await
            .map_err(|err| CoreError::Resource(err.to_string()))?;

        self.fire_on_hls(seq, duration_secs).await;
        Ok(())
    }

    async fn write_ts_segment(&mut self, seq: u64) -> CoreResult<(String, Option<crate::crypto::SegmentKey>, Option<String>)> {
        let writer = std::mem::replace(&mut self.pending_ts, TsSegmentWriter::new());
        let plaintext = writer.finish();

        let filename = format!("{seq}.ts");
        let path = self.output_dir.join(&filename);

        let (bytes_out, key, key_uri) = match &mut self.key_rotation {
            Some(rotation) => {
                let (key, _rotated) = rotation.next_segment_key();
                (key.encrypt(&plaintext), Some(key), Some("stream.key".to_string()))
            }
            None => (plaintext.to_vec(), None, None),
        };

        tokio::fs::write(&path, &bytes_out).await.map_err(|err| CoreError::Resource(err.to_string()))?;
        Ok((filename, key, key_uri))
    }

    async fn write_fmp4_segment(&mut self, seq: u64) -> CoreResult<(String, Option<crate::crypto::SegmentKey>, Option<String>)> {
        if seq == 0 {
            let init = fmp4::build_init_segment(self.saw_video, self.saw_audio);
            let init_path = self.output_dir.join("init.mp4");
            tokio::fs::write(&init_path, &init).await.map_err(|err| CoreError::Resource(err.to_string()))?;
        }

        let packets = std::mem::take(&mut self.pending_fmp4);
        let track_id = if self.saw_video { fmp4::VIDEO_TRACK_ID } else { fmp4::AUDIO_TRACK_ID };
        let segment = fmp4::build_media_segment(track_id, seq as u32, &packets);

        let filename = format!("{seq}.m4s");
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, &segment).await.map_err(|err| CoreError::Resource(err.to_string()))?;
        Ok((filename, None, None))
    }

    async fn fire_on_hls(&self, seq: u64, duration: f64) {
        let payload = HookPayload {
            server_id: "hls-mux".to_string(),
            service_id: self.url.canonical_key(),
            action: HookAction::OnHls,
            client_id: String::new(),
            ip: String::new(),
            vhost: self.url.vhost.clone(),
            app: self.url.app.clone(),
            stream: self.url.stream.clone(),
            param: None,
            ts_url: Some(format!("{}/{seq}.ts", self.url.stream)),
            duration: Some(duration),
        };
        if let Err(err) = self.hooks.call(&payload).await {
            debug!(error = %err, stream = %self.url, "on_hls hook rejected or failed");
        }
        info!(stream = %self.url, sequence = seq, "hls segment closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use streamcfg::{HooksConfig, SourceConfig};
    use source_hub::SourceManager;

    fn config() -> HlsConfig {
        let mut c = HlsConfig::default();
        c.fragment = Duration::from_millis(100);
        c.window = Duration::from_secs(10);
        c.wait_keyframe = true;
        c
    }

    #[tokio::test]
    async fn reaps_a_ts_segment_on_keyframe_after_fragment_length() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = Arc::new(HookClient::new(HooksConfig::default()));
        let url = StreamUrl::new("__defaultVhost__", "live", "foo");
        let manager = SourceManager::new(SourceConfig::default());
        let source = manager.fetch_or_create(&url);

        let mut session = HlsSession::new(url, config(), dir.path().to_str().unwrap(), hooks);

        source.on_publish();
        source.on_flv(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x01])));
        source.on_flv(MediaPacket::new(MediaKind::Video, 150, Bytes::from_static(&[0x17, 0x01])));
        source.on_unpublish();

        // run() drains until the consumer closes; simulate that directly
        // by draining a bounded number of items instead of spawning, to
        // keep the test deterministic.
        let consumer = source.create_consumer();
        while let Ok(item) = tokio::time::timeout(Duration::from_millis(50), consumer.recv()).await {
            let Ok(item) = item else { break };
            if let MediaItem::Flv(packet) = item {
                session.ingest(packet).await.unwrap();
            }
        }

        let segment_path = dir.path().join("live").join("foo").join("0.ts");
        assert!(segment_path.exists(), "expected a ts segment to be written after a keyframe crossed the fragment boundary");
        let playlist_path = dir.path().join("live").join("foo").join("index.m3u8");
        let playlist_text = tokio::fs::read_to_string(playlist_path).await.unwrap();
        assert!(playlist_text.contains("0.ts"));
    }

    #[tokio::test]
    async fn encrypted_segments_carry_a_key_in_the_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = Arc::new(HookClient::new(HooksConfig::default()));
        let url = StreamUrl::new("__defaultVhost__", "live", "bar");
        let mut cfg = config();
        cfg.encrypt = true;
        cfg.fragments_per_key = 2;
        let mut session = HlsSession::new(url, cfg, dir.path().to_str().unwrap(), hooks);

        session.ingest(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x01]))).await.unwrap();
        session.ingest(MediaPacket::new(MediaKind::Video, 150, Bytes::from_static(&[0x17, 0x01]))).await.unwrap();
        session.reap().await.unwrap();

        let playlist_path = dir.path().join("live").join("bar").join("index.m3u8");
        let playlist_text = tokio::fs::read_to_string(playlist_path).await.unwrap();
        assert!(playlist_text.contains("#EXT-X-KEY:METHOD=AES-128"));
    }
}
