//! Outbound HTTP hook calls (SPEC_FULL §6): `on_connect`, `on_publish`,
//! etc. are POSTed as JSON to operator-configured URLs. A 2xx response
//! with `{"code":0}` accepts the action; anything else aborts it with
//! `CoreError::Unauthorized`.

use std::time::Duration;

use proto_types::{CoreError, CoreResult, HookPayload, HookResponse};
use streamcfg::HooksConfig;
use tracing::warn;

const HOOK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HookClient {
    client: reqwest::Client,
    config: HooksConfig,
}

impl HookClient {
    pub fn new(config: HooksConfig) -> Self {
        HookClient {
            client: reqwest::Client::builder().timeout(HOOK_TIMEOUT).build().unwrap_or_default(),
            config,
        }
    }

    fn url_for(&self, action: &proto_types::HookAction) -> Option<&str> {
        use proto_types::HookAction::*;
        match action {
            OnConnect => self.config.on_connect.as_deref(),
            OnClose => self.config.on_close.as_deref(),
            OnPublish => self.config.on_publish.as_deref(),
            OnUnpublish => self.config.on_unpublish.as_deref(),
            OnPlay => self.config.on_play.as_deref(),
            OnStop => self.config.on_stop.as_deref(),
            OnHls => self.config.on_hls.as_deref(),
            OnHlsNotify => self.config.on_hls_notify.as_deref(),
            OnDvr => self.config.on_dvr.as_deref(),
        }
    }

    /// Call the hook configured for `payload.action`; an unconfigured
    /// hook is treated as an implicit accept (no operator opt-in means
    /// no restriction), matching the admission contract in SPEC_FULL §6.
    pub async fn call(&self, payload: &HookPayload) -> CoreResult<()> {
        let Some(url) = self.url_for(&payload.action) else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| CoreError::Unauthorized(format!("hook request to {url} failed: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Unauthorized(format!("hook {url} returned status {}", response.status())));
        }

        let body: HookResponse = response
            .json()
            .await
            .map_err(|err| CoreError::Unauthorized(format!("hook {url} returned malformed body: {err}")))?;

        if !body.is_accept() {
            warn!(url, code = body.code, "hook rejected action");
            return Err(CoreError::Unauthorized(format!("hook {url} rejected with code {}", body.code)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto_types::HookAction;

    #[tokio::test]
    async fn unconfigured_hook_is_implicit_accept() {
        let client = HookClient::new(HooksConfig::default());
        let payload = HookPayload {
            server_id: "srv".into(),
            service_id: "svc".into(),
            action: HookAction::OnPublish,
            client_id: "cid".into(),
            ip: "127.0.0.1".into(),
            vhost: "v".into(),
            app: "live".into(),
            stream: "foo".into(),
            param: None,
            ts_url: None,
            duration: None,
        };
        assert!(client.call(&payload).await.is_ok());
    }
}
