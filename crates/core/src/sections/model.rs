//! Domain models for analytic sections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::kinds::SectionKind;
use super::types::PlayerKey;
use crate::errors::Result;

// =============================================================================
// Section Status
// =============================================================================

/// Canonical lifecycle status of a section.
///
/// `NotStarted` and `Fetching` are in-progress; `Ready`, `NoMatches` and
/// `Failed` are terminal. `Unrecognized` carries a backend token that none of
/// the known vocabularies matched; it is treated as in-progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SectionStatus {
    NotStarted,
    Fetching,
    Ready,
    NoMatches,
    Failed,
    Unrecognized(String),
}

impl SectionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SectionStatus::NotStarted => "NOT_STARTED",
            SectionStatus::Fetching => "FETCHING",
            SectionStatus::Ready => "READY",
            SectionStatus::NoMatches => "NO_MATCHES",
            SectionStatus::Failed => "FAILED",
            SectionStatus::Unrecognized(token) => token,
        }
    }

    /// Matches one of the canonical names, ignoring case.
    pub fn from_canonical(token: &str) -> Option<Self> {
        let status = match token.trim().to_ascii_uppercase().as_str() {
            "NOT_STARTED" => SectionStatus::NotStarted,
            "FETCHING" => SectionStatus::Fetching,
            "READY" => SectionStatus::Ready,
            "NO_MATCHES" => SectionStatus::NoMatches,
            "FAILED" => SectionStatus::Failed,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SectionStatus::Ready | SectionStatus::NoMatches | SectionStatus::Failed
        )
    }

    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }

    /// Terminal and not a failure.
    pub fn is_success(&self) -> bool {
        matches!(self, SectionStatus::Ready | SectionStatus::NoMatches)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SectionStatus {
    fn from(value: String) -> Self {
        SectionStatus::from_canonical(&value).unwrap_or(SectionStatus::Unrecognized(value))
    }
}

impl From<SectionStatus> for String {
    fn from(status: SectionStatus) -> Self {
        match status {
            SectionStatus::Unrecognized(token) => token,
            other => other.as_str().to_string(),
        }
    }
}

// =============================================================================
// Section Payloads
// =============================================================================

/// Headline numbers shown as summary cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCards {
    pub matches_played: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub total_claims: f64,
    pub total_falls: f64,
    pub claim_fall_ratio: f64,
    pub average_score: f64,
    pub favorite_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStat {
    pub role: String,
    pub matches: u32,
    pub win_rate: f64,
    pub claims: u32,
    /// Percentage of all matches played in this role.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionStat {
    pub name: String,
    pub games: u32,
    pub win_rate: f64,
    pub claims: f64,
    pub falls: f64,
    pub claim_fall_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    pub score: f64,
    pub level: String,
    pub volatility: f64,
    pub tilt_index: f64,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub headline: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// Typed payload of a ready section, one variant per [`SectionKind`].
///
/// Serialized as the bare inner value; the kind travels alongside it (map key,
/// storage column), so decoding goes through [`SectionData::decode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SectionData {
    SummaryCards(SummaryCards),
    Roles(Vec<RoleStat>),
    Champions(Vec<ChampionStat>),
    RiskProfile(RiskProfile),
    Narrative(Narrative),
}

impl SectionData {
    /// Decodes a previously serialized payload of the given kind.
    pub fn decode(kind: SectionKind, value: serde_json::Value) -> Result<Self> {
        let data = match kind {
            SectionKind::SummaryCards => SectionData::SummaryCards(serde_json::from_value(value)?),
            SectionKind::Roles => SectionData::Roles(serde_json::from_value(value)?),
            SectionKind::Champions => SectionData::Champions(serde_json::from_value(value)?),
            SectionKind::RiskProfile => SectionData::RiskProfile(serde_json::from_value(value)?),
            SectionKind::Narrative => SectionData::Narrative(serde_json::from_value(value)?),
        };
        Ok(data)
    }
}

// =============================================================================
// Section
// =============================================================================

/// Result envelope for one analytic facet.
///
/// Invariant: `status == Ready` exactly when `data` is present. The
/// constructors uphold it, so fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section<T = SectionData> {
    status: SectionStatus,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> Section<T> {
    pub fn not_started() -> Self {
        Self::with_status(SectionStatus::NotStarted, None)
    }

    pub fn fetching() -> Self {
        Self::with_status(SectionStatus::Fetching, None)
    }

    pub fn ready(data: T) -> Self {
        Self {
            status: SectionStatus::Ready,
            data: Some(data),
            message: None,
        }
    }

    pub fn no_matches(message: Option<String>) -> Self {
        Self::with_status(SectionStatus::NoMatches, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(SectionStatus::Failed, Some(message.into()))
    }

    /// Builds a data-less section. `Ready` cannot be data-less and degrades to
    /// `NotStarted`, which makes the slot eligible for a refresh.
    pub fn with_status(status: SectionStatus, message: Option<String>) -> Self {
        let status = match status {
            SectionStatus::Ready => SectionStatus::NotStarted,
            other => other,
        };
        Self {
            status,
            data: None,
            message,
        }
    }

    /// Reassembles a section from loosely-typed parts, restoring the invariant.
    pub fn from_parts(status: SectionStatus, data: Option<T>, message: Option<String>) -> Self {
        match (status, data) {
            (SectionStatus::Ready, Some(data)) => Self {
                status: SectionStatus::Ready,
                data: Some(data),
                message,
            },
            (status, _) => Self::with_status(status, message),
        }
    }

    pub fn status(&self) -> &SectionStatus {
        &self.status
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_in_progress(&self) -> bool {
        self.status.is_in_progress()
    }

    pub fn is_failed(&self) -> bool {
        self.status == SectionStatus::Failed
    }

    /// Ready and carrying data, i.e. nothing left to refresh.
    pub fn is_ready_with_data(&self) -> bool {
        self.status == SectionStatus::Ready && self.data.is_some()
    }

    /// The FETCHING transition: drops data and any previous message.
    pub fn into_fetching(self) -> Self {
        Self::fetching()
    }
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self::not_started()
    }
}

/// The persisted unit: latest known section for one (player, kind) slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    pub player_key: PlayerKey,
    pub kind: SectionKind,
    pub section: Section,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Player Sections (aggregate)
// =============================================================================

/// Sections of one player, keyed and iterated in [`SectionKind`] order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct PlayerSections {
    sections: BTreeMap<SectionKind, Section>,
}

impl PlayerSections {
    /// Starts every requested kind at `NotStarted`.
    pub fn new(kinds: &[SectionKind]) -> Self {
        Self {
            sections: kinds
                .iter()
                .map(|kind| (*kind, Section::not_started()))
                .collect(),
        }
    }

    pub fn insert(&mut self, kind: SectionKind, section: Section) {
        self.sections.insert(kind, section);
    }

    pub fn get(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.get(&kind)
    }

    /// Takes every section of `other`, overwriting kinds present in both.
    pub fn merge(&mut self, other: PlayerSections) {
        self.sections.extend(other.sections);
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, &Section)> {
        self.sections.iter().map(|(kind, section)| (*kind, section))
    }

    pub fn kinds(&self) -> Vec<SectionKind> {
        self.sections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Kinds that still need polling.
    pub fn in_progress_kinds(&self) -> Vec<SectionKind> {
        self.iter()
            .filter(|(_, section)| section.is_in_progress())
            .map(|(kind, _)| kind)
            .collect()
    }

    /// True while any section is non-terminal.
    pub fn loading(&self) -> bool {
        self.sections.values().any(Section::is_in_progress)
    }

    /// Message of the first failed section in kind order.
    pub fn error(&self) -> Option<&str> {
        self.sections
            .values()
            .find(|section| section.is_failed())
            .map(|section| section.message().unwrap_or_default())
    }

    /// Every section is READY or NO_MATCHES.
    pub fn is_fully_successful(&self) -> bool {
        self.sections
            .values()
            .all(|section| section.status().is_success())
    }

    pub fn contains_all(&self, kinds: &[SectionKind]) -> bool {
        kinds.iter().all(|kind| self.sections.contains_key(kind))
    }

    /// Copy restricted to the given kinds (missing ones are skipped).
    pub fn subset(&self, kinds: &[SectionKind]) -> Self {
        Self {
            sections: kinds
                .iter()
                .filter_map(|kind| self.sections.get(kind).map(|s| (*kind, s.clone())))
                .collect(),
        }
    }
}
