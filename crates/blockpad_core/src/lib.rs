#![doc = include_str!(concat!(env!("OUT_DIR"), "/README.md"))]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Pages and blocks as stored
pub mod model;

/// Conversion between stored blocks and the editor tree
pub mod projection;

/// Debounced autosave with status reporting
pub mod save;

/// Cancellable delayed tasks (real and virtual time)
pub mod scheduler;

/// Editor session (active page, switching, page lifecycle)
pub mod session;

/// Storage backends for pages and blocks
pub mod storage;

#[cfg(test)]
pub mod test_utils;
