//! Native JSON-RPC client for Bitcoin Core compatible endpoints.
//!
//! Implements [`BitcoinRpc`](super::BitcoinRpc) over JSON-RPC using
//! `reqwest`, with HTTP transport, optional request rate limiting, basic or
//! cookie auth, and a factory that builds a fresh client per connection.

mod client;
mod connection;
mod parsing;
mod protocol;

pub use client::{HttpRpcClient, HttpRpcConfig, HttpRpcFactory};
