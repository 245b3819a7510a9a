//! Statline Core - section synchronization engine.
//!
//! This crate contains the domain model and orchestration logic for player
//! analytics sections. It is database-agnostic and defines the store trait
//! implemented by the `storage-sqlite` crate.

pub mod constants;
pub mod errors;
pub mod sections;

pub use sections::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
