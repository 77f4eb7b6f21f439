//! Utility modules for the relay
//!
//! Reusable helpers shared by the portal client, the relay servers and the
//! orchestrator.

pub mod http_client;
pub mod retry;
pub mod url;

pub use http_client::HttpClients;
pub use retry::{RetryPolicy, Retryable};
pub use url::UrlUtils;
