//! Builds the SDP answer for `/rtc/v1/publish/` and `/rtc/v1/play/`,
//! grounded on `sdp.rs`'s `SessionDescription`/`MediaDescription` model:
//! the answer mirrors the offer's media sections and payload types but
//! substitutes this server's own ICE credentials, DTLS fingerprint and
//! local candidate, per RFC 8839/RFC 5763 offer/answer rules.

use rtc::{Attribute, Connection, MediaDescription, Origin, SessionDescription};
use rtc::IceAgent;

pub struct AnswerInputs<'a> {
    pub offer: &'a SessionDescription,
    pub ice: &'a IceAgent,
    pub local_fingerprint: &'a str,
    pub local_candidate: &'a str,
    /// `true` for a publish (server receives media), `false` for play
    /// (server sends media).
    pub server_receives: bool,
}

pub fn build_answer(inputs: &AnswerInputs<'_>) -> SessionDescription {
    let direction = if inputs.server_receives { "recvonly" } else { "sendonly" };

    let media_descriptions = inputs
        .offer
        .media_descriptions
        .iter()
        .map(|offer_media| answer_media(offer_media, inputs, direction))
        .collect();

    SessionDescription {
        version: 0,
        origin: Origin {
            username: "-".to_string(),
            session_id: inputs.offer.origin.session_id,
            session_version: inputs.offer.origin.session_version + 1,
            network_type: "IN".to_string(),
            address_type: "IP4".to_string(),
            unicast_address: "0.0.0.0".to_string(),
        },
        session_name: "media-server".to_string(),
        session_info: None,
        uri: None,
        emails: Vec::new(),
        phones: Vec::new(),
        connection: Some(Connection {
            network_type: "IN".to_string(),
            address_type: "IP4".to_string(),
            address: "0.0.0.0".to_string(),
        }),
        bandwidth: Vec::new(),
        timing: vec![rtc::sdp::Timing { start: 0, stop: 0 }],
        repeat: Vec::new(),
        time_zones: Vec::new(),
        encryption_key: None,
        attributes: vec![attr("group", Some(group_value(&inputs.offer.media_descriptions)))],
        media_descriptions,
    }
}

fn group_value(media: &[MediaDescription]) -> String {
    let mids: Vec<String> = media
        .iter()
        .filter_map(|m| m.attributes.iter().find(|a| a.name == "mid").and_then(|a| a.value.clone()))
        .collect();
    format!("BUNDLE {}", mids.join(" "))
}

fn answer_media(offer_media: &MediaDescription, inputs: &AnswerInputs<'_>, direction: &str) -> MediaDescription {
    let mut attributes = vec![
        attr("ice-ufrag", Some(inputs.ice.local_ufrag.clone())),
        attr("ice-pwd", Some(inputs.ice.local_password.clone())),
        attr("fingerprint", Some(format!("sha-256 {}", inputs.local_fingerprint))),
        attr("setup", Some("active".to_string())),
        attr("candidate", Some(inputs.local_candidate.to_string())),
        attr(direction, None),
        attr("rtcp-mux", None),
    ];
    if let Some(mid) = offer_media.attributes.iter().find(|a| a.name == "mid") {
        attributes.push(mid.clone());
    }

    MediaDescription {
        media_type: offer_media.media_type.clone(),
        port: 9,
        port_count: None,
        protocol: offer_media.protocol.clone(),
        payload_types: offer_media.payload_types.clone(),
        media_title: None,
        connection: Some(Connection {
            network_type: "IN".to_string(),
            address_type: "IP4".to_string(),
            address: "0.0.0.0".to_string(),
        }),
        bandwidth: Vec::new(),
        encryption_key: None,
        attributes,
    }
}

fn attr(name: &str, value: Option<String>) -> Attribute {
    Attribute { name: name.to_string(), value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn offer() -> SessionDescription {
        SessionDescription::parse(
            "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:0\r\na=ice-ufrag:abc\r\na=ice-pwd:def\r\na=fingerprint:sha-256 AA:BB\r\na=sendonly\r\n",
        )
        .unwrap()
    }

    #[test]
    fn answer_mirrors_media_type_and_payload_types() {
        let ice = IceAgent::new(Uuid::new_v4());
        let offer = offer();
        let inputs = AnswerInputs {
            offer: &offer,
            ice: &ice,
            local_fingerprint: "11:22",
            local_candidate: "1 1 UDP 2130706431 127.0.0.1 8000 typ host",
            server_receives: true,
        };
        let answer = build_answer(&inputs);
        assert_eq!(answer.media_descriptions.len(), 1);
        assert_eq!(answer.media_descriptions[0].media_type, "video");
        assert_eq!(answer.media_descriptions[0].payload_types, vec![96]);
        assert!(answer.media_descriptions[0].attributes.iter().any(|a| a.name == "recvonly"));
    }
}
