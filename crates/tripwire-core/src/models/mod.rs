//! Data models for Tripwire

mod exception;
mod options;

pub use exception::*;
pub use options::*;
