//! REST implementation of [`CampaignBackend`]

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::backend::{
    CallSid, CampaignBackend, FromNumber, IvrCallRequest, RedirectRequest, RemoteCallStatus,
};
use crate::config::BackendConfig;
use crate::error::{DialerError, DialerResult, ErrorContext};
use crate::recovery::{retry_with_backoff, RetryConfig};

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    #[serde(alias = "callSid", alias = "call_sid")]
    sid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FromNumbersResponse {
    Wrapped { numbers: Vec<FromNumber> },
    Bare(Vec<FromNumber>),
}

/// Backend client over the campaign REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    retry: RetryConfig,
}

impl HttpBackend {
    /// Build a client from backend configuration
    pub fn new(config: &BackendConfig) -> DialerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("dialer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DialerError::config("backend", e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            retry: RetryConfig::from(&config.retry),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> DialerResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(DialerError::Backend {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                message
            },
        })
    }
}

#[async_trait]
impl CampaignBackend for HttpBackend {
    #[instrument(skip(self, request), fields(to = %request.to))]
    async fn dispatch_call(&self, request: &IvrCallRequest) -> DialerResult<CallSid> {
        let response = self
            .send(self.client.post(self.url("bulk-calls/single")).json(request))
            .await
            .with_context(|| format!("dispatching call to {}", request.to))?;
        let body: DispatchResponse = response.json().await?;
        debug!(sid = %body.sid, "Call dispatched");
        Ok(CallSid(body.sid))
    }

    async fn call_status(&self, sid: &CallSid) -> DialerResult<RemoteCallStatus> {
        let response = self
            .send(self.client.get(self.url(&format!("bulk-calls/status/{sid}"))))
            .await?;
        let body: StatusResponse = response.json().await?;
        Ok(RemoteCallStatus::parse(&body.status))
    }

    #[instrument(skip(self, request), fields(sid = %sid, to = %request.to))]
    async fn redirect_call(&self, sid: &CallSid, request: &RedirectRequest) -> DialerResult<()> {
        self.send(
            self.client
                .post(self.url(&format!("calls/{sid}/redirect")))
                .json(request),
        )
        .await
        .map_err(|e| DialerError::TransferFailed {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn list_from_numbers(&self) -> DialerResult<Vec<FromNumber>> {
        let this = self;
        retry_with_backoff("list_from_numbers", self.retry.clone(), || async move {
            let response = this.send(this.client.get(this.url("from-numbers"))).await?;
            let body: FromNumbersResponse = response.json().await?;
            Ok(match body {
                FromNumbersResponse::Wrapped { numbers } => numbers,
                FromNumbersResponse::Bare(numbers) => numbers,
            })
        })
        .await
    }
}
