//! Signed REST transport for the USDⓈ-M futures API.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExchangeConfig;
use crate::error::{LadderError, Result};
use crate::exchange::types::ApiErrorBody;
use crate::exchange::{ExchangeTransport, Params};
use crate::signing::{canonical_query, ApiCredentials, QuerySigner};

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Clone)]
pub struct FuturesRestClient {
    http: Client,
    base_url: String,
    signer: Option<QuerySigner>,
    recv_window_ms: u64,
}

impl FuturesRestClient {
    pub fn new(
        base_url: &str,
        credentials: Option<ApiCredentials>,
        timeout: Duration,
        recv_window_ms: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("ladderfill/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer: credentials.map(QuerySigner::new),
            recv_window_ms,
        })
    }

    /// Build a client for the configured environment, reading credentials from env.
    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        Self::new(
            config.base_url(),
            config.credentials_from_env(),
            config.timeout(),
            config.recv_window_ms,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.signer.is_some()
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }

    async fn read_response(method: &Method, path: &str, resp: Response) -> Result<Value> {
        let status = resp.status();
        let text = resp.text().await?;

        if status.as_u16() >= 400 {
            let (code, message, body) = match serde_json::from_str::<Value>(&text) {
                Ok(body) => {
                    let parsed = serde_json::from_value::<ApiErrorBody>(body.clone()).ok();
                    let code = parsed.as_ref().and_then(|p| p.code);
                    let message = parsed
                        .and_then(|p| p.msg)
                        .unwrap_or_else(|| text.clone());
                    (code, message, body)
                }
                Err(_) => (None, text.clone(), json!({ "raw": text })),
            };

            warn!(
                method = %method,
                path,
                status = status.as_u16(),
                code = ?code,
                "exchange rejected request: {}",
                message
            );

            return Err(LadderError::Exchange {
                status: status.as_u16(),
                code,
                message,
                body,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            LadderError::InvalidResponse(format!("{} {} returned invalid JSON: {}", method, path, e))
        })
    }
}

#[async_trait]
impl ExchangeTransport for FuturesRestClient {
    async fn signed_request(&self, method: Method, path: &str, params: Params) -> Result<Value> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            LadderError::Configuration(
                "API key/secret are not set for the selected environment".to_string(),
            )
        })?;

        let mut params = params;
        params.push(("timestamp".to_string(), Utc::now().timestamp_millis().to_string()));
        params.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        let query = signer.signed_query(&params)?;

        debug!(method = %method, path, "signed request");

        let resp = self
            .http
            .request(method.clone(), self.url(path, &query))
            .header(API_KEY_HEADER, signer.api_key())
            .send()
            .await?;

        Self::read_response(&method, path, resp).await
    }

    async fn public_request(&self, path: &str, params: Params) -> Result<Value> {
        let query = canonical_query(&params);

        debug!(path, "public request");

        let resp = self.http.get(self.url(path, &query)).send().await?;

        Self::read_response(&Method::GET, path, resp).await
    }
}
