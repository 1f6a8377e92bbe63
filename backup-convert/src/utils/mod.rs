//! Utility modules for the backup converter.

pub mod errors;
pub mod logger;

pub use errors::{ConvertError, Result};
