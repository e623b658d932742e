use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::Result;

/// Ordered query parameters; order is preserved on the wire and in the signature.
pub type Params = Vec<(String, String)>;

/// Build [`Params`] from borrowed pairs.
pub fn params<K: AsRef<str>, V: ToString>(pairs: &[(K, V)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
        .collect()
}

/// Request/response seam to the exchange REST API.
///
/// Everything above this trait (rules cache, position oracle, order gateway,
/// engine) speaks JSON through it, so tests can substitute a scripted exchange.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// Authenticated call; timestamp, recvWindow and signature are added here.
    async fn signed_request(&self, method: Method, path: &str, params: Params) -> Result<Value>;

    /// Unauthenticated GET.
    async fn public_request(&self, path: &str, params: Params) -> Result<Value>;
}
