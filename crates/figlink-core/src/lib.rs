//! # figlink-core
//!
//! Shared vocabulary for the figlink crates:
//!
//! - **Branded IDs**: [`ids::CallbackName`] and [`ids::SubscriptionId`] as newtypes
//! - **Panics**: [`panic::panic_message`] for logging caught callback panics
//! - **Logging**: subscriber setup, dispatcher propagation onto background
//!   threads, and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod panic;

pub use ids::{CallbackName, SubscriptionId};
pub use panic::panic_message;
