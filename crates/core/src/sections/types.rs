//! Strong identifier types for the section engine.
//!
//! - `PlayerKey` - Whose analytics are being requested
//! - `SectionKey` - One (player, section kind) slot; the unit of caching,
//!   persistence and refresh exclusion

use serde::{Deserialize, Serialize};
use std::fmt;

use super::kinds::SectionKind;
use crate::errors::ValidationError;

// =============================================================================
// PlayerKey
// =============================================================================

/// Identity of a player as understood by the analysis backend.
///
/// Examples: "Faker#KR1", "player-4412"
///
/// Surrounding whitespace is trimmed; casing is preserved because the
/// backend treats keys as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerKey(String);

impl PlayerKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("playerKey".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PlayerKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PlayerKey {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerKey> for String {
    fn from(key: PlayerKey) -> Self {
        key.0
    }
}

impl AsRef<str> for PlayerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// SectionKey
// =============================================================================

/// A single (player, section kind) slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionKey {
    pub player_key: PlayerKey,
    pub kind: SectionKind,
}

impl SectionKey {
    pub fn new(player_key: PlayerKey, kind: SectionKind) -> Self {
        Self { player_key, kind }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.player_key, self.kind)
    }
}
