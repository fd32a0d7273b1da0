//! Error types for the WebRTC connection engine.

use thiserror::Error;

pub type RtcResult<T> = Result<T, RtcError>;

#[derive(Error, Debug)]
pub enum RtcError {
    #[error("RTP packet parse error: {0}")]
    RtpParseError(String),

    #[error("SRTP error: {0}")]
    SrtpError(String),

    #[error("invalid packet format: {0}")]
    InvalidPacket(String),

    #[error("DTLS error: {0}")]
    DtlsError(String),

    #[error("ICE error: {0}")]
    IceError(String),

    #[error("SDP error: {0}")]
    SdpError(String),

    #[error("connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    #[error("invalid connection state: {state}")]
    InvalidConnectionState { state: String },

    #[error("buffer error: {0}")]
    BufferError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("codec error: {0}")]
    CodecError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for RtcError {
    fn from(err: std::io::Error) -> Self {
        RtcError::NetworkError(err.to_string())
    }
}

impl From<RtcError> for proto_types::CoreError {
    fn from(err: RtcError) -> Self {
        match err {
            RtcError::DtlsError(_) => proto_types::CoreError::Fatal(err.to_string()),
            RtcError::ConnectionNotFound { .. } | RtcError::InvalidConnectionState { .. } => {
                proto_types::CoreError::Resource(err.to_string())
            }
            _ => proto_types::CoreError::Protocol(err.to_string()),
        }
    }
}
