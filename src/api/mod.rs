// src/api/mod.rs

pub mod handlers;
pub mod server;
pub mod server_config; // Server limits and defaults
pub mod stream;        // WebSocket event stream

pub use server::{create_router, MonitorServer};
