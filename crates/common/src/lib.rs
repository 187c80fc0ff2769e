//! Common types, protocol definitions, and errors shared across `filesync` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
