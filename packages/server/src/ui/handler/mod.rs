//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{board_data, health_check, info, whoami};
pub use websocket::websocket_handler;
