//! Common types, protocol definitions, and errors shared across the bank-credential vault crates.

pub mod error;
pub mod protocol;
pub mod record;

pub use error::ServiceError;
