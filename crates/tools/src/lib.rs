//! Tool gateway client and intent dispatcher.
//!
//! [`GatewayClient`] handles the `/tools/invoke` wire protocol; [`ToolRouter`]
//! maps parsed intents to the exact argument shapes the gateway expects,
//! retries transient failures with exponential backoff, and caps result
//! length per tool.

mod client;
mod router;
mod search;

pub use client::GatewayClient;
pub use router::ToolRouter;
pub use search::extract_search_urls;
