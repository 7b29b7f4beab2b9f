//! Shared building blocks for the city weather service: error taxonomy,
//! retrying HTTP client, domain models and tracing setup.

pub mod errors;
pub mod http_client;
pub mod models;
pub mod tracing;
