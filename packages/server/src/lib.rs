//! Collaborative pixel canvas server.
//!
//! Clients watch a shared board over WebSocket and place pixels at a rate
//! limited by a per-user regenerating allowance.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
