//! Section repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;
use tokio::sync::broadcast;

use statline_core::sections::{
    PlayerKey, Section, SectionChangeFeed, SectionKey, SectionKind, SectionMutator, SectionRecord,
    SectionRepositoryTrait,
};
use statline_core::Result;

use super::model::PlayerSectionDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::player_sections;
use crate::schema::player_sections::dsl::*;

/// Reads go through the pool; writes go through the single writer, which
/// serializes every `write` and `update`. Each committed change is published
/// on the change feed.
pub struct SectionRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
    feed: SectionChangeFeed,
}

impl SectionRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self {
            pool,
            writer,
            feed: SectionChangeFeed::new(),
        }
    }

    fn find_row(
        conn: &mut SqliteConnection,
        key: &PlayerKey,
        kind: SectionKind,
    ) -> Result<Option<PlayerSectionDB>> {
        player_sections
            .find((key.as_str(), kind.as_str()))
            .select(PlayerSectionDB::as_select())
            .first::<PlayerSectionDB>(conn)
            .optional()
            .into_core()
    }
}

#[async_trait]
impl SectionRepositoryTrait for SectionRepository {
    fn read_record(&self, key: &PlayerKey, kind: SectionKind) -> Result<Option<SectionRecord>> {
        let mut conn = get_connection(&self.pool)?;
        Self::find_row(&mut conn, key, kind)?
            .map(PlayerSectionDB::into_record)
            .transpose()
    }

    async fn write(
        &self,
        key: &PlayerKey,
        kind: SectionKind,
        section: Section,
    ) -> Result<SectionRecord> {
        let now = Utc::now();
        let row = PlayerSectionDB::from_section(key, kind, &section, now)?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::replace_into(player_sections::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await?;

        self.feed.publish(SectionKey::new(key.clone(), kind));
        Ok(SectionRecord {
            player_key: key.clone(),
            kind,
            section,
            updated_at: now,
        })
    }

    async fn update(
        &self,
        key: &PlayerKey,
        kind: SectionKind,
        mutator: SectionMutator,
    ) -> Result<SectionRecord> {
        let owned_key = key.clone();

        let record = self
            .writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SectionRecord> {
                let current = match Self::find_row(conn, &owned_key, kind)? {
                    Some(row) => row.into_record()?.section,
                    None => Section::not_started(),
                };
                let now = Utc::now();
                let next = mutator(current);
                let row = PlayerSectionDB::from_section(&owned_key, kind, &next, now)?;
                diesel::replace_into(player_sections::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(SectionRecord {
                    player_key: owned_key,
                    kind,
                    section: next,
                    updated_at: now,
                })
            })
            .await?;

        self.feed.publish(SectionKey::new(key.clone(), kind));
        Ok(record)
    }

    fn subscribe(&self) -> broadcast::Receiver<SectionKey> {
        self.feed.subscribe()
    }
}
