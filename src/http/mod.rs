//! HTTP transport for the dispatcher
//!
//! Provides the external API routing: the `/rpc` endpoint plus health and discovery.

pub mod handlers;
