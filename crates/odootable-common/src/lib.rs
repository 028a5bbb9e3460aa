//! Common library for odootable
//!
//! Types shared by the client, the resolution core and the command line tool.
//!
//! Modules:
//! * `error`: Defines error types and handling.
//! * `value`: Defines the values exchanged with the remote server.

pub mod error;
pub mod value;

// Re-export commonly used types at the base
pub use error::*;
pub use value::Value;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
