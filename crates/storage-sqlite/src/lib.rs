//! SQLite storage implementation for statline.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the store trait defined in `statline-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - The section repository and its database model
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies exist.
//!
//! ```text
//!        core (domain)
//!              │
//!              ▼
//!  storage-sqlite (this crate)
//!              │
//!              ▼
//!          SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

// Repository implementations
pub mod sections;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use sections::SectionRepository;

// Re-export from statline-core for convenience
pub use statline_core::errors::{DatabaseError, Error, Result};
