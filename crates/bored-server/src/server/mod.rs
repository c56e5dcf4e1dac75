//! HTTP/WebSocket front end and client listeners

mod listener;
mod router;
mod ws;

pub use listener::{ClientListener, HttpServer};
pub use router::router;
pub use ws::{agent_transport, split_client, WsClientReader, WsClientWriter};
