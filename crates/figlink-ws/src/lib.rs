//! # figlink-ws
//!
//! WebSocket endpoints for figlink.
//!
//! Both roles share one design: a service thread drives the socket(s) on a
//! current-thread tokio runtime and pushes every inbound text frame into a
//! [`CallbackDispatcher`], whose executor thread hands each message to a
//! snapshot of the registered callbacks.
//!
//! - [`WebsocketServer`]: accepts any number of peers, `send` fans out
//! - [`WebsocketClient`]: one outbound connection
//! - [`memory::MemoryEndpoint`]: in-process endpoint for testing upper layers

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod peers;
pub mod server;
pub mod service;
mod session;

pub use client::WebsocketClient;
pub use dispatcher::{CallbackDispatcher, MessageCallback};
pub use endpoint::WebsocketEndpoint;
pub use error::EndpointError;
pub use server::WebsocketServer;
