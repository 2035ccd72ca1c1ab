//! Protection layer for bank credentials held on client records.
//!
//! Account and routing numbers are sealed with AES-256-GCM under either a
//! portable shared key or a device-local ephemeral key, stored next to
//! display-safe masked fields, and recovered later by trying each key in turn.

pub mod cascade;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod keys;
pub mod lifecycle;
pub mod server;
pub mod telemetry;
