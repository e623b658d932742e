use crate::error::{LadderError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// API key pair for signed endpoints
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiCredentials {
    pub api_key: String,
    secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, secret: String) -> Self {
        Self { api_key, secret }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &format_args!("<{} chars>", self.api_key.len()))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Encode params as `k=v&k=v`, preserving insertion order.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Signs canonical query strings with HMAC-SHA256
#[derive(Clone, Debug)]
pub struct QuerySigner {
    credentials: ApiCredentials,
}

impl QuerySigner {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self { credentials }
    }

    pub fn api_key(&self) -> &str {
        &self.credentials.api_key
    }

    /// Hex-encoded HMAC-SHA256 of `payload` keyed by the secret
    pub fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.as_bytes())
            .map_err(|e| LadderError::Configuration(format!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build the final query string with `&signature=...` appended.
    pub fn signed_query(&self, params: &[(String, String)]) -> Result<String> {
        let mut query = canonical_query(params);
        let signature = self.sign(&query)?;
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str("signature=");
        query.push_str(&signature);
        Ok(query)
    }
}
