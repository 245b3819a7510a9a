//! Database model for persisted sections.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};

use statline_core::sections::{PlayerKey, Section, SectionData, SectionKind, SectionRecord, SectionStatus};
use statline_core::Result;

use crate::errors::StorageError;

/// One row per (player, kind). `data` holds the payload as JSON text.
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::player_sections)]
#[diesel(primary_key(player_key, section_kind))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlayerSectionDB {
    pub player_key: String,
    pub section_kind: String,
    pub status: String,
    pub data: Option<String>,
    pub message: Option<String>,
    pub updated_at: String,
}

impl PlayerSectionDB {
    pub fn from_section(
        player_key: &PlayerKey,
        kind: SectionKind,
        section: &Section,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let data = section.data().map(serde_json::to_string).transpose()?;
        Ok(Self {
            player_key: player_key.as_str().to_string(),
            section_kind: kind.as_str().to_string(),
            status: section.status().as_str().to_string(),
            data,
            message: section.message().map(str::to_string),
            updated_at: updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        })
    }

    /// Rebuilds the domain record.
    ///
    /// A payload that no longer decodes is dropped, which turns a READY row
    /// into NOT_STARTED and so makes it eligible for a refresh.
    pub fn into_record(self) -> Result<SectionRecord> {
        let player_key = PlayerKey::new(self.player_key)?;
        let kind: SectionKind = self.section_kind.parse()?;
        let data = self.data.and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| StorageError::InvalidRow(e.to_string()))
                .and_then(|value| {
                    SectionData::decode(kind, value)
                        .map_err(|e| StorageError::InvalidRow(e.to_string()))
                })
                .map_err(|e| warn!("Dropping undecodable {} payload for {}: {}", kind, player_key, e))
                .ok()
        });
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Ok(SectionRecord {
            section: Section::from_parts(SectionStatus::from(self.status), data, self.message),
            player_key,
            kind,
            updated_at,
        })
    }
}
