pub mod hmac;

pub use hmac::{canonical_query, ApiCredentials, QuerySigner};
