//! # figlink
//!
//! Drive Plotly.js figures in a browser from Rust.
//!
//! A [`Figure`] owns a WebSocket server, a JSON-RPC session over it and an
//! HTTP server for the page. Plotting operations are `Plotly.*` calls on the
//! page; events come back as notifications.
//!
//! ```text
//! Figure ──call──▶ JsonRpc ──▶ WebsocketServer ══ws══▶ page (Plotly.js)
//!    ▲                                                     │
//!    └──────────── event notifications ◀──────────────────┘
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod figure;
pub mod http;

pub use error::FigureError;
pub use events::{EventCallback, EventRegistry};
pub use figure::Figure;
pub use figlink_settings::FigureSettings;
pub use http::{HttpContent, HttpServer};
