//! Section storage module.
//!
//! Provides persistence for analytic sections, one row per (player, kind).

pub mod model;
pub mod repository;

pub use model::PlayerSectionDB;
pub use repository::SectionRepository;
