pub mod traits;
pub mod types;

pub use traits::{params, ExchangeTransport, Params};
