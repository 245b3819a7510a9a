//! Tolerant payload mapping.
//!
//! Backend payloads are untrusted and spell the same field several ways
//! (`total_claims`, `totalClaims`, `claims`, ...). Each typed field is read
//! from an ordered list of candidate keys: the first key present with a
//! non-null value wins, and a value that cannot be coerced (or is not finite)
//! yields the caller's default. Mapping never fails; required fields that
//! stay absent are derived from the ones that are present.

use serde_json::{Map, Value};

use super::model::{ChampionStat, Narrative, RiskProfile, RoleStat, SectionData, SummaryCards};
use crate::constants::DISPLAY_PLACEHOLDER;

// =============================================================================
// Field Extraction
// =============================================================================

/// Read-only view over one JSON value with typed, multi-key lookups.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    value: &'a Value,
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn object(&self) -> Option<&'a Map<String, Value>> {
        self.value.as_object()
    }

    /// First candidate key that is present and not null.
    pub fn lookup(&self, keys: &[&str]) -> Option<&'a Value> {
        let object = self.object()?;
        keys.iter()
            .filter_map(|key| object.get(*key))
            .find(|value| !value.is_null())
    }

    pub fn opt_number(&self, keys: &[&str]) -> Option<f64> {
        self.lookup(keys).and_then(coerce_number)
    }

    pub fn number(&self, keys: &[&str], default: f64) -> f64 {
        self.opt_number(keys).unwrap_or(default)
    }

    /// Non-negative whole count; fractional values are rounded.
    pub fn count(&self, keys: &[&str], default: u32) -> u32 {
        self.opt_number(keys).map(to_count).unwrap_or(default)
    }

    pub fn opt_text(&self, keys: &[&str]) -> Option<String> {
        self.lookup(keys).and_then(coerce_text)
    }

    pub fn text(&self, keys: &[&str], default: &str) -> String {
        self.opt_text(keys).unwrap_or_else(|| default.to_string())
    }

    /// A list of strings; a single string is treated as a one-element list.
    pub fn strings(&self, keys: &[&str]) -> Vec<String> {
        match self.lookup(keys) {
            Some(Value::Array(items)) => items.iter().filter_map(coerce_text).collect(),
            Some(other) => coerce_text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Nested records, with the map key (if any) they were found under.
    ///
    /// When the viewed value is itself an array it is used directly; otherwise
    /// the first candidate key may hold an array of objects or an object whose
    /// entries are keyed by name.
    pub fn records(&self, keys: &[&str]) -> Vec<(Option<&'a str>, Fields<'a>)> {
        let source = match self.value {
            Value::Array(_) => Some(self.value),
            _ => self.lookup(keys),
        };
        match source {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| (None, Fields::new(item)))
                .collect(),
            Some(Value::Object(entries)) => entries
                .iter()
                .filter(|(_, item)| item.is_object())
                .map(|(name, item)| (Some(name.as_str()), Fields::new(item)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Numbers pass through, numeric-looking strings are parsed (a trailing `%`
/// is allowed); anything non-finite is rejected.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_count(value: f64) -> u32 {
    value.max(0.0).round().min(u32::MAX as f64) as u32
}

/// Rounds to 2 decimals. A result that overflows to a non-finite value
/// becomes 0, so derived fields always serialize as numbers.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

// =============================================================================
// Derived Fields
// =============================================================================

/// claims / falls, rounded to 2 decimals. Zero falls yields the claim count.
pub fn claim_fall_ratio(claims: f64, falls: f64) -> f64 {
    if falls > 0.0 {
        round2(claims / falls)
    } else {
        round2(claims)
    }
}

/// Claim count estimated from a win-rate percentage: round(matches × rate / 100).
pub fn estimate_claims(matches: u32, win_rate_pct: f64) -> u32 {
    to_count(matches as f64 * win_rate_pct / 100.0)
}

/// LOW below 34, MEDIUM below 67, HIGH otherwise.
pub fn risk_level_for(score: f64) -> &'static str {
    if score < 34.0 {
        "LOW"
    } else if score < 67.0 {
        "MEDIUM"
    } else {
        "HIGH"
    }
}

// =============================================================================
// Candidate Keys
// =============================================================================

const MATCHES_KEYS: &[&str] = &[
    "matches_played",
    "matchesPlayed",
    "total_matches",
    "totalMatches",
    "matches",
    "games_played",
    "gamesPlayed",
    "games",
];
const WINS_KEYS: &[&str] = &["wins", "total_wins", "totalWins"];
const WIN_RATE_KEYS: &[&str] = &["win_rate", "winRate", "winrate", "win_pct", "winPct"];
const CLAIMS_KEYS: &[&str] = &["total_claims", "totalClaims", "claims", "kills"];
const FALLS_KEYS: &[&str] = &["total_falls", "totalFalls", "falls", "deaths"];
const RATIO_KEYS: &[&str] = &[
    "claim_fall_ratio",
    "claimFallRatio",
    "cf_ratio",
    "kd_ratio",
    "kdRatio",
];

// =============================================================================
// Per-Kind Mappers
// =============================================================================

pub fn map_summary_cards(fields: &Fields<'_>) -> SectionData {
    let matches_played = fields.count(MATCHES_KEYS, 0);
    let wins = fields.count(WINS_KEYS, 0);
    let win_rate = fields.opt_number(WIN_RATE_KEYS).unwrap_or_else(|| {
        if matches_played > 0 {
            round2(wins as f64 / matches_played as f64 * 100.0)
        } else {
            0.0
        }
    });
    let total_claims = fields.number(CLAIMS_KEYS, 0.0);
    let total_falls = fields.number(FALLS_KEYS, 0.0);
    let claim_fall_ratio = fields
        .opt_number(RATIO_KEYS)
        .unwrap_or_else(|| claim_fall_ratio(total_claims, total_falls));

    SectionData::SummaryCards(SummaryCards {
        matches_played,
        wins,
        win_rate,
        total_claims,
        total_falls,
        claim_fall_ratio,
        average_score: fields.number(
            &["average_score", "averageScore", "avg_score", "avgScore", "score"],
            0.0,
        ),
        favorite_role: fields.text(
            &["favorite_role", "favoriteRole", "main_role", "mainRole", "top_role"],
            DISPLAY_PLACEHOLDER,
        ),
    })
}

pub fn map_roles(fields: &Fields<'_>) -> SectionData {
    let records = fields.records(&["roles", "role_stats", "roleStats", "items"]);

    // Share needs the total across all roles, so it is resolved in a second pass.
    let mapped: Vec<(RoleStat, Option<f64>)> = records
        .iter()
        .map(|(name, role)| {
            let matches = role.count(MATCHES_KEYS, 0);
            let win_rate = role.number(WIN_RATE_KEYS, 0.0);
            let claims = role
                .opt_number(&["claims", "total_claims", "totalClaims", "claim_count"])
                .map(to_count)
                .unwrap_or_else(|| estimate_claims(matches, win_rate));
            let stat = RoleStat {
                role: role
                    .opt_text(&["role", "name", "position", "lane"])
                    .or_else(|| name.map(str::to_string))
                    .unwrap_or_else(|| DISPLAY_PLACEHOLDER.to_string()),
                matches,
                win_rate,
                claims,
                share: 0.0,
            };
            let share = role.opt_number(&["share", "play_rate", "playRate", "pick_rate"]);
            (stat, share)
        })
        .collect();

    let total_matches: u64 = mapped.iter().map(|(role, _)| u64::from(role.matches)).sum();
    let roles = mapped
        .into_iter()
        .map(|(role, share)| {
            let derived = if total_matches > 0 {
                round2(role.matches as f64 / total_matches as f64 * 100.0)
            } else {
                0.0
            };
            RoleStat {
                share: share.unwrap_or(derived),
                ..role
            }
        })
        .collect();

    SectionData::Roles(roles)
}

pub fn map_champions(fields: &Fields<'_>) -> SectionData {
    let champions = fields
        .records(&["champions", "champion_stats", "championStats", "items"])
        .iter()
        .map(|(name, champion)| {
            let claims = champion.number(CLAIMS_KEYS, 0.0);
            let falls = champion.number(FALLS_KEYS, 0.0);
            ChampionStat {
                name: champion
                    .opt_text(&["champion", "name", "champion_name", "championName"])
                    .or_else(|| name.map(str::to_string))
                    .unwrap_or_else(|| DISPLAY_PLACEHOLDER.to_string()),
                games: champion.count(MATCHES_KEYS, 0),
                win_rate: champion.number(WIN_RATE_KEYS, 0.0),
                claims,
                falls,
                claim_fall_ratio: champion
                    .opt_number(RATIO_KEYS)
                    .unwrap_or_else(|| claim_fall_ratio(claims, falls)),
            }
        })
        .collect();

    SectionData::Champions(champions)
}

pub fn map_risk_profile(fields: &Fields<'_>) -> SectionData {
    let score = fields.number(&["risk_score", "riskScore", "score"], 0.0);
    SectionData::RiskProfile(RiskProfile {
        score,
        level: fields
            .opt_text(&["risk_level", "riskLevel", "level", "label"])
            .map(|level| level.to_ascii_uppercase())
            .unwrap_or_else(|| risk_level_for(score).to_string()),
        volatility: fields.number(&["volatility", "performance_volatility"], 0.0),
        tilt_index: fields.number(&["tilt_index", "tiltIndex", "tilt"], 0.0),
        flags: fields.strings(&["flags", "warnings", "risk_factors", "riskFactors", "notes"]),
    })
}

pub fn map_narrative(fields: &Fields<'_>) -> SectionData {
    SectionData::Narrative(Narrative {
        headline: fields.text(&["headline", "title"], DISPLAY_PLACEHOLDER),
        summary: fields.text(&["summary", "narrative", "body", "text"], DISPLAY_PLACEHOLDER),
        strengths: fields.strings(&["strengths", "highlights"]),
        improvements: fields.strings(&[
            "improvements",
            "weaknesses",
            "areas_to_improve",
            "areasToImprove",
        ]),
    })
}
