#![allow(clippy::neg_cmp_op_on_partial_ord)]
#![allow(clippy::doc_lazy_continuation)]
// src/lib.rs

// Attack detection and recovery engine
pub mod monitor;

// HTTP / WebSocket relay
pub mod api;

pub use monitor::{Monitor, MonitorConfig, MonitorError};
