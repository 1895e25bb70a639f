//! Concrete implementations of the port traits.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod memory_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
