// Shared helpers used by the watch supervisor, the per-file tasks and the
// transfer backends.

pub mod constants;
pub mod file_utils;

// Re-export commonly used items
pub use constants::*;
pub use file_utils::*;
