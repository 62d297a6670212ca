//! Utility modules supporting download operations.

mod http;

pub use http::HttpClient;
