//! Section kinds and their per-kind configuration.
//!
//! Every analytic facet shares the same engine; what differs per kind lives in
//! a static [`SectionDescriptor`]: the wire key, the human label used in
//! status messages, and the payload mapper.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::mapper::{self, Fields};
use super::model::SectionData;
use crate::errors::ValidationError;

/// One analytic facet of a player.
///
/// Declaration order is significant: aggregates iterate kinds in this order,
/// so "first failed section" is deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    #[serde(alias = "summaryCards")]
    SummaryCards,
    Roles,
    Champions,
    #[serde(alias = "riskProfile")]
    RiskProfile,
    Narrative,
}

/// Static configuration for one section kind.
pub struct SectionDescriptor {
    pub kind: SectionKind,
    /// Stable identifier used in URLs and storage.
    pub key: &'static str,
    /// Human label used when composing status messages.
    pub context: &'static str,
    /// Builds the typed payload from tolerant field lookups.
    pub map_payload: fn(&Fields<'_>) -> SectionData,
}

static DESCRIPTORS: [SectionDescriptor; 5] = [
    SectionDescriptor {
        kind: SectionKind::SummaryCards,
        key: "summary_cards",
        context: "your summary stats",
        map_payload: mapper::map_summary_cards,
    },
    SectionDescriptor {
        kind: SectionKind::Roles,
        key: "roles",
        context: "your role breakdown",
        map_payload: mapper::map_roles,
    },
    SectionDescriptor {
        kind: SectionKind::Champions,
        key: "champions",
        context: "your champion pool",
        map_payload: mapper::map_champions,
    },
    SectionDescriptor {
        kind: SectionKind::RiskProfile,
        key: "risk_profile",
        context: "your risk profile",
        map_payload: mapper::map_risk_profile,
    },
    SectionDescriptor {
        kind: SectionKind::Narrative,
        key: "narrative",
        context: "your performance narrative",
        map_payload: mapper::map_narrative,
    },
];

impl SectionKind {
    /// All kinds in declaration order.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::SummaryCards,
        SectionKind::Roles,
        SectionKind::Champions,
        SectionKind::RiskProfile,
        SectionKind::Narrative,
    ];

    pub fn descriptor(self) -> &'static SectionDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.descriptor().key
    }

    pub fn context(self) -> &'static str {
        self.descriptor().context
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = ValidationError;

    /// Accepts the snake_case key as well as camelCase and kebab-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        SectionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == folded)
            .ok_or_else(|| ValidationError::UnknownSectionKind(s.to_string()))
    }
}

/// Parses a comma-separated list of kinds, keeping first-seen order and
/// dropping duplicates. An empty list means every kind.
pub fn parse_kind_list(raw: &str) -> Result<Vec<SectionKind>, ValidationError> {
    let mut kinds = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = part.parse::<SectionKind>()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        kinds.extend(SectionKind::ALL);
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_line_up_with_kinds() {
        for kind in SectionKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn parses_alternate_spellings() {
        assert_eq!(
            "summaryCards".parse::<SectionKind>().unwrap(),
            SectionKind::SummaryCards
        );
        assert_eq!(
            "risk-profile".parse::<SectionKind>().unwrap(),
            SectionKind::RiskProfile
        );
        assert_eq!("ROLES".parse::<SectionKind>().unwrap(), SectionKind::Roles);
        assert!("matchups".parse::<SectionKind>().is_err());
    }

    #[test]
    fn kind_list_dedupes_and_defaults_to_all() {
        let kinds = parse_kind_list("roles, champions,roles").unwrap();
        assert_eq!(kinds, vec![SectionKind::Roles, SectionKind::Champions]);
        assert_eq!(parse_kind_list("").unwrap(), SectionKind::ALL.to_vec());
    }

    #[test]
    fn serde_uses_snake_case_and_accepts_camel_case() {
        let json = serde_json::to_string(&SectionKind::RiskProfile).unwrap();
        assert_eq!(json, "\"risk_profile\"");
        let kind: SectionKind = serde_json::from_str("\"summaryCards\"").unwrap();
        assert_eq!(kind, SectionKind::SummaryCards);
    }
}
