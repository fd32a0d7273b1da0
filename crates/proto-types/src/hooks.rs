//! Outbound HTTP hook payloads fired on session lifecycle events.
//!
//! A 2xx response with `{"code":0}` means accept; any other response
//! aborts the corresponding action with `CoreError::Unauthorized`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    OnConnect,
    OnClose,
    OnPublish,
    OnUnpublish,
    OnPlay,
    OnStop,
    OnHls,
    OnHlsNotify,
    OnDvr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPayload {
    pub server_id: String,
    pub service_id: String,
    pub action: HookAction,
    pub client_id: String,
    pub ip: String,
    pub vhost: String,
    pub app: String,
    pub stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Present only for `on_hls`/`on_hls_notify`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookResponse {
    pub code: i32,
}

impl HookResponse {
    pub fn is_accept(&self) -> bool {
        self.code == 0
    }
}
