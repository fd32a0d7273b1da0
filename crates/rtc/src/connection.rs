//! The per-peer WebRTC connection state machine, grounded on
//! `stream_manager.rs`'s connection bookkeeping and generalized from its
//! proprietary session shape down to the ICE/DTLS/SRTP sequence a browser peer
//! actually drives: `Init -> WaitingStun -> DtlsHandshake -> Established
//! -> Closed`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use proto_types::{CoreError, CoreResult, TrackDescription};
use streamrt::Interrupt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dtls::{DtlsConnection, DtlsState};
use crate::ice::{IceAgent, IceConnectionState};
use crate::srtp_pipeline::SrtpPipeline;

/// The connection's lifecycle phase. Each transition is one-way; a
/// connection that reaches `Closed` is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    WaitingStun,
    DtlsHandshake,
    Established,
    Closed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Init => 0,
            ConnectionState::WaitingStun => 1,
            ConnectionState::DtlsHandshake => 2,
            ConnectionState::Established => 3,
            ConnectionState::Closed => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Init,
            1 => ConnectionState::WaitingStun,
            2 => ConnectionState::DtlsHandshake,
            3 => ConnectionState::Established,
            _ => ConnectionState::Closed,
        }
    }

    /// Whether `next` is a legal transition from `self`.
    fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Init, WaitingStun)
                | (WaitingStun, DtlsHandshake)
                | (DtlsHandshake, Established)
                | (Init, Closed)
                | (WaitingStun, Closed)
                | (DtlsHandshake, Closed)
                | (Established, Closed)
        )
    }
}

struct Negotiated {
    tracks: Vec<TrackDescription>,
    srtp: Option<Arc<SrtpPipeline>>,
}

/// One publisher or subscriber's WebRTC peer connection.
pub struct PeerConnection {
    pub id: Uuid,
    state: AtomicU8,
    pub ice: Mutex<IceAgent>,
    pub dtls: Mutex<DtlsConnection>,
    negotiated: Mutex<Option<Negotiated>>,
    pub interrupt: Interrupt,
}

impl PeerConnection {
    pub fn new(dtls: DtlsConnection) -> Arc<Self> {
        let id = Uuid::new_v4();
        Arc::new(PeerConnection {
            id,
            state: AtomicU8::new(ConnectionState::Init.as_u8()),
            ice: Mutex::new(IceAgent::new(id)),
            dtls: Mutex::new(dtls),
            negotiated: Mutex::new(None),
            interrupt: Interrupt::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, next: ConnectionState) -> CoreResult<()> {
        let current = self.state();
        if !current.can_advance_to(next) {
            return Err(CoreError::Fatal(format!(
                "illegal connection transition {:?} -> {:?}",
                current, next
            )));
        }
        self.state.store(next.as_u8(), Ordering::Release);
        debug!(connection = %self.id, from = ?current, to = ?next, "connection state transition");
        Ok(())
    }

    /// ICE candidates have started arriving; move past `Init`.
    pub fn begin_ice(&self) -> CoreResult<()> {
        self.transition(ConnectionState::WaitingStun)
    }

    /// At least one candidate pair succeeded: start the DTLS handshake.
    pub fn ice_connected(&self) -> CoreResult<()> {
        {
            let ice = self.ice.lock().unwrap();
            if ice.connection_state != IceConnectionState::Connected
                && ice.connection_state != IceConnectionState::Completed
            {
                return Err(CoreError::Protocol("ice_connected called before ICE succeeded".into()));
            }
        }
        self.transition(ConnectionState::DtlsHandshake)
    }

    /// DTLS handshake finished: record the derived SRTP keys and the
    /// negotiated tracks, then move to `Established`.
    pub fn dtls_established(&self, tracks: Vec<TrackDescription>, srtp: SrtpPipeline) -> CoreResult<()> {
        {
            let dtls = self.dtls.lock().unwrap();
            if dtls.state != DtlsState::Connected {
                return Err(CoreError::Fatal("dtls_established called before handshake finished".into()));
            }
        }
        *self.negotiated.lock().unwrap() = Some(Negotiated { tracks, srtp: Some(Arc::new(srtp)) });
        self.transition(ConnectionState::Established)
    }

    pub fn tracks(&self) -> Vec<TrackDescription> {
        self.negotiated
            .lock()
            .unwrap()
            .as_ref()
            .map(|n| n.tracks.clone())
            .unwrap_or_default()
    }

    /// The negotiated SRTP pipeline, once the DTLS handshake has
    /// completed; `None` before `Established` or for a connection that
    /// never negotiated SRTP.
    pub fn srtp(&self) -> Option<Arc<SrtpPipeline>> {
        self.negotiated.lock().unwrap().as_ref().and_then(|n| n.srtp.clone())
    }

    pub fn close(&self) {
        self.interrupt.interrupt();
        if self.transition(ConnectionState::Closed).is_err() {
            warn!(connection = %self.id, "close requested from a state with no legal transition, forcing");
            self.state.store(ConnectionState::Closed.as_u8(), Ordering::Release);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }
}
