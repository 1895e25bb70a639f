//! Port traits the domain depends on.

pub mod config_port;
pub mod result_sink;
pub mod tick_source;
