//! Fragmented MP4 (`init.mp4` + `.m4s`) output path, grounded on
//! `SrsInitMp4Segment`/`SrsHlsM4sSegment` in `srs_app_hls.hpp`: an init
//! segment carries the `ftyp`/`moov` boxes describing the video/audio
//! tracks, and each subsequent media segment is a standalone
//! `moof`/`mdat` fragment referencing those track ids.
//!
//! Full ISO/IEC 14496-12 sample tables (`stbl`, `stsd` codec-specific
//! entries) are out of scope here; this builds the box structure a
//! segmenter needs to produce a playable CMAF-style fragment, not a
//! general-purpose MP4 muxer.

use bytes::{BufMut, Bytes, BytesMut};

use proto_types::{MediaKind, MediaPacket};

pub const VIDEO_TRACK_ID: u32 = 1;
pub const AUDIO_TRACK_ID: u32 = 2;

fn boxed(kind: &[u8; 4], body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(8 + body.len());
    out.put_u32((8 + body.len()) as u32);
    out.put_slice(kind);
    out.put_slice(body);
    out.freeze()
}

fn concat(boxes: &[Bytes]) -> BytesMut {
    let mut out = BytesMut::new();
    for b in boxes {
        out.extend_from_slice(b);
    }
    out
}

fn ftyp() -> Bytes {
    let mut body = BytesMut::new();
    body.put_slice(b"iso5"); // major brand
    body.put_u32(0); // minor version
    body.put_slice(b"iso5");
    body.put_slice(b"dash");
    boxed(b"ftyp", &body)
}

fn mvhd() -> Bytes {
    let mut body = BytesMut::new();
    body.put_u32(0); // version + flags
    body.put_u32(0); // creation_time
    body.put_u32(0); // modification_time
    body.put_u32(1000); // timescale
    body.put_u32(0); // duration (unknown, fragmented)
    body.put_i32(0x0001_0000); // rate 1.0
    body.put_i16(0x0100); // volume 1.0
    body.put_u16(0); // reserved
    body.put_u64(0); // reserved
    for v in [0x0001_0000i32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        body.put_i32(v); // unity matrix
    }
    body.put_bytes(0, 24); // pre_defined
    body.put_u32(VIDEO_TRACK_ID + AUDIO_TRACK_ID + 1); // next_track_ID
    boxed(b"mvhd", &body)
}

fn trak(track_id: u32, handler: &[u8; 4]) -> Bytes {
    let mut tkhd = BytesMut::new();
    tkhd.put_u32(0x0000_0003); // version + flags (enabled, in movie)
    tkhd.put_u32(0);
    tkhd.put_u32(0);
    tkhd.put_u32(track_id);
    tkhd.put_u32(0); // reserved
    tkhd.put_u32(0); // duration
    tkhd.put_u64(0); // reserved
    tkhd.put_i16(0); // layer
    tkhd.put_i16(0); // alternate_group
    tkhd.put_i16(0); // volume
    tkhd.put_u16(0); // reserved
    for v in [0x0001_0000i32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        tkhd.put_i32(v);
    }
    tkhd.put_u32(0); // width
    tkhd.put_u32(0); // height

    let mut hdlr = BytesMut::new();
    hdlr.put_u32(0);
    hdlr.put_u32(0); // pre_defined
    hdlr.put_slice(handler);
    hdlr.put_bytes(0, 12); // reserved
    hdlr.put_slice(b"handler\0");

    let mdhd = {
        let mut body = BytesMut::new();
        body.put_u32(0);
        body.put_u32(0);
        body.put_u32(0);
        body.put_u32(1000); // timescale
        body.put_u32(0); // duration
        body.put_u16(0x55C4); // language "und"
        body.put_u16(0);
        boxed(b"mdhd", &body)
    };

    let minf = boxed(b"minf", &concat(&[boxed(b"dinf", &[]), boxed(b"stbl", &empty_stbl())]));
    let mdia = boxed(b"mdia", &concat(&[mdhd, boxed(b"hdlr", &hdlr), minf]));
    boxed(b"trak", &concat(&[boxed(b"tkhd", &tkhd), mdia]))
}

fn empty_stbl() -> BytesMut {
    let empty_table = |kind: &[u8; 4]| boxed(kind, &[0, 0, 0, 0]); // version/flags + entry_count=0
    concat(&[
        empty_table(b"stsd"),
        empty_table(b"stts"),
        empty_table(b"stsc"),
        empty_table(b"stsz"),
        empty_table(b"stco"),
    ])
}

fn mvex(track_ids: &[u32]) -> Bytes {
    let trexes: Vec<Bytes> = track_ids
        .iter()
        .map(|&id| {
            let mut body = BytesMut::new();
            body.put_u32(0);
            body.put_u32(id);
            body.put_u32(1); // default_sample_description_index
            body.put_u32(0); // default_sample_duration
            body.put_u32(0); // default_sample_size
            body.put_u32(0); // default_sample_flags
            boxed(b"trex", &body)
        })
        .collect();
    boxed(b"mvex", &concat(&trexes))
}

/// Build `init.mp4`'s bytes for the given set of tracks.
pub fn build_init_segment(has_video: bool, has_audio: bool) -> Bytes {
    let mut tracks = Vec::new();
    let mut track_ids = Vec::new();
    if has_video {
        tracks.push(trak(VIDEO_TRACK_ID, b"vide"));
        track_ids.push(VIDEO_TRACK_ID);
    }
    if has_audio {
        tracks.push(trak(AUDIO_TRACK_ID, b"soun"));
        track_ids.push(AUDIO_TRACK_ID);
    }
    let mut moov_children = vec![mvhd()];
    moov_children.extend(tracks);
    moov_children.push(mvex(&track_ids));
    let moov = boxed(b"moov", &concat(&moov_children));

    concat(&[ftyp(), moov]).freeze()
}

fn mfhd(sequence_number: u32) -> Bytes {
    let mut body = BytesMut::new();
    body.put_u32(0);
    body.put_u32(sequence_number);
    boxed(b"mfhd", &body)
}

fn traf(track_id: u32, base_dts: u64, sample_sizes: &[u32]) -> Bytes {
    let mut tfhd = BytesMut::new();
    tfhd.put_u32(0x02_0000); // default-base-is-moof
    tfhd.put_u32(track_id);

    let mut tfdt = BytesMut::new();
    tfdt.put_u32(0x0100_0000); // version 1 (64-bit base_media_decode_time)
    tfdt.put_u64(base_dts);

    let mut trun = BytesMut::new();
    trun.put_u32(0x00_0201); // flags: sample-size-present, data-offset-present
    trun.put_u32(sample_sizes.len() as u32);
    trun.put_i32(0); // data_offset, patched by caller if needed
    for &size in sample_sizes {
        trun.put_u32(size);
    }

    boxed(
        b"traf",
        &concat(&[boxed(b"tfhd", &tfhd), boxed(b"tfdt", &tfdt), boxed(b"trun", &trun)]),
    )
}

/// Build one `.m4s` media segment: a `moof` describing the samples in
/// `packets` (single-track: callers call this once per track they carry)
/// followed by an `mdat` holding the concatenated payloads.
pub fn build_media_segment(track_id: u32, sequence_number: u32, packets: &[MediaPacket]) -> Bytes {
    let base_dts = packets.first().map(|p| p.dts.max(0) as u64).unwrap_or(0);
    let sample_sizes: Vec<u32> = packets.iter().map(|p| p.payload().len() as u32).collect();

    let moof = boxed(b"moof", &concat(&[mfhd(sequence_number), traf(track_id, base_dts, &sample_sizes)]));

    let mut mdat_body = BytesMut::new();
    for packet in packets {
        mdat_body.extend_from_slice(packet.payload());
    }
    let mdat = boxed(b"mdat", &mdat_body);

    concat(&[moof, mdat]).freeze()
}

/// Which track a packet belongs to, for callers splitting a mixed
/// audio/video stream into per-track segment calls.
pub fn track_id_for(kind: MediaKind) -> Option<u32> {
    match kind {
        MediaKind::Video => Some(VIDEO_TRACK_ID),
        MediaKind::Audio => Some(AUDIO_TRACK_ID),
        MediaKind::Script => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes as BytesCrate;

    fn box_kind(data: &[u8], offset: usize) -> &[u8] {
        &data[offset + 4..offset + 8]
    }

    #[test]
    fn init_segment_starts_with_ftyp_then_moov() {
        let init = build_init_segment(true, true);
        assert_eq!(box_kind(&init, 0), b"ftyp");
        let ftyp_len = u32::from_be_bytes(init[0..4].try_into().unwrap()) as usize;
        assert_eq!(box_kind(&init, ftyp_len), b"moov");
    }

    #[test]
    fn init_segment_box_sizes_cover_the_whole_buffer() {
        let init = build_init_segment(true, false);
        let ftyp_len = u32::from_be_bytes(init[0..4].try_into().unwrap()) as usize;
        let moov_len = u32::from_be_bytes(init[ftyp_len..ftyp_len + 4].try_into().unwrap()) as usize;
        assert_eq!(ftyp_len + moov_len, init.len());
    }

    #[test]
    fn media_segment_starts_with_moof_then_mdat() {
        let packets = vec![MediaPacket::new(proto_types::MediaKind::Video, 0, BytesCrate::from_static(&[1, 2, 3]))];
        let segment = build_media_segment(VIDEO_TRACK_ID, 1, &packets);
        assert_eq!(box_kind(&segment, 0), b"moof");
        let moof_len = u32::from_be_bytes(segment[0..4].try_into().unwrap()) as usize;
        assert_eq!(box_kind(&segment, moof_len), b"mdat");
    }

    #[test]
    fn mdat_contains_concatenated_sample_payloads() {
        let packets = vec![
            MediaPacket::new(proto_types::MediaKind::Audio, 0, BytesCrate::from_static(&[0xAA])),
            MediaPacket::new(proto_types::MediaKind::Audio, 20, BytesCrate::from_static(&[0xBB, 0xCC])),
        ];
        let segment = build_media_segment(AUDIO_TRACK_ID, 1, &packets);
        assert!(segment.windows(3).any(|w| w == [0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn track_id_for_maps_media_and_skips_script() {
        assert_eq!(track_id_for(MediaKind::Video), Some(VIDEO_TRACK_ID));
        assert_eq!(track_id_for(MediaKind::Audio), Some(AUDIO_TRACK_ID));
        assert_eq!(track_id_for(MediaKind::Script), None);
    }
}
