//! Photocap Common Library
//!
//! Shared value types, log-directory resolution and input validation used by
//! the capture service and the command-line front end.

pub mod logging;
pub mod security;
pub mod types;

pub use types::*;
