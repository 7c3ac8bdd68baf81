//! Global log stream instances, one per core.

use crate::logging::LogStream;

/// Core 0: device driver and stream lifecycle.
pub static ACQ_LOG_STREAM: LogStream = LogStream::new();

/// Core 1: forwarding task, network and supervisor.
pub static NET_LOG_STREAM: LogStream = LogStream::new();
