//! Outbound service adapters.
//!
//! Routes and services only see the connector traits, so tests swap in the
//! `#[cfg(test)]` mocks and never open a socket.

pub mod chat_api;
pub mod errors;

pub use chat_api::{ChatApiClient, ChatApiConnector, ChatApiRequest, ChatImage};
pub use errors::ConnectorError;
