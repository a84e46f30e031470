//! WebSocket relay between the server's bookmark context and remote ones.

pub mod handler;
pub mod messages;

pub use handler::ws_handler;
