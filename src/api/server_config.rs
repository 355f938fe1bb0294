//! Server limits

use std::time::Duration;

/// Concurrent request limit
pub const MAX_CONCURRENCY: usize = 256;

/// Request body size limit
pub const MAX_BODY_SIZE: usize = 64 * 1024; // 64KB

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PORT: u16 = 3000;
