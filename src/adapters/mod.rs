pub mod futures_rest;

pub use futures_rest::FuturesRestClient;
