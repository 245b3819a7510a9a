//! Status normalization.
//!
//! Turns whatever the analysis backend returned (or the error it raised) into
//! a canonical [`Section`]. Status tokens are matched case-insensitively after
//! folding `-` and spaces to `_`; unknown tokens are passed through as
//! [`SectionStatus::Unrecognized`].

use log::{debug, warn};
use serde_json::Value;

use super::client::AnalysisError;
use super::kinds::SectionKind;
use super::mapper::Fields;
use super::model::{Section, SectionStatus};
use crate::constants::GENERIC_FAILURE_MESSAGE;

const READY_TOKENS: &[&str] = &[
    "READY",
    "SUCCESS",
    "SUCCEEDED",
    "COMPLETED",
    "COMPLETE",
    "DONE",
    "FINISHED",
    "OK",
];
const ACTIVE_TOKENS: &[&str] = &["PENDING", "PROCESSING", "IN_PROGRESS", "STARTED", "FETCHING"];
const IDLE_TOKENS: &[&str] = &["", "UNKNOWN"];
const ERROR_TOKENS: &[&str] = &["ERROR", "FAILED"];

const STATUS_KEYS: &[&str] = &["status", "state", "job_status", "jobStatus"];
const PAYLOAD_KEYS: &[&str] = &["data", "result", "payload", "analysis"];
const MESSAGE_KEYS: &[&str] = &["message", "detail", "error"];

/// Whether a FETCHING status came from a token that says work is underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchActivity {
    Processing,
    NotYetStarted,
}

/// Outcome of [`normalize_status`]: the canonical status plus the token it
/// was derived from (trimmed, original casing; `None` when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedStatus {
    pub status: SectionStatus,
    pub token: Option<String>,
}

impl NormalizedStatus {
    pub fn activity(&self) -> FetchActivity {
        let folded = fold(self.token.as_deref().unwrap_or_default());
        if ACTIVE_TOKENS.contains(&folded.as_str()) {
            FetchActivity::Processing
        } else {
            FetchActivity::NotYetStarted
        }
    }
}

fn fold(token: &str) -> String {
    token.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

/// Maps a raw backend status token onto the canonical vocabulary.
pub fn normalize_status(raw: Option<&str>) -> NormalizedStatus {
    let token = raw.map(str::trim).map(str::to_string);
    let folded = fold(token.as_deref().unwrap_or_default());

    let status = if READY_TOKENS.contains(&folded.as_str()) {
        SectionStatus::Ready
    } else if IDLE_TOKENS.contains(&folded.as_str()) || ACTIVE_TOKENS.contains(&folded.as_str()) {
        SectionStatus::Fetching
    } else if ERROR_TOKENS.contains(&folded.as_str()) {
        SectionStatus::Failed
    } else if let Some(canonical) = SectionStatus::from_canonical(&folded) {
        canonical
    } else {
        SectionStatus::Unrecognized(token.clone().unwrap_or_default())
    };

    NormalizedStatus { status, token }
}

/// Human-readable message for a non-READY status.
pub fn status_message(normalized: &NormalizedStatus, kind: SectionKind) -> String {
    let context = kind.context();
    match &normalized.status {
        SectionStatus::Fetching => match normalized.activity() {
            FetchActivity::Processing => {
                format!("The analysis service is still processing {}.", context)
            }
            FetchActivity::NotYetStarted => {
                format!("Waiting for the analysis service to start on {}.", context)
            }
        },
        SectionStatus::NotStarted => {
            format!("Waiting for the analysis service to start on {}.", context)
        }
        SectionStatus::NoMatches => format!("No recent matches found for {}.", context),
        SectionStatus::Failed => format!("The analysis service failed to produce {}.", context),
        SectionStatus::Unrecognized(token) => format!(
            "The analysis service reported status '{}' for {}.",
            token, context
        ),
        SectionStatus::Ready => String::new(),
    }
}

/// Builds a section from a backend envelope.
///
/// READY runs the kind's payload mapper over the payload (`data`, `result`,
/// ... or the envelope itself). FAILED prefers the backend's own message.
pub fn normalize_payload(kind: SectionKind, envelope: &Value) -> Section {
    let fields = Fields::new(envelope);
    let normalized = normalize_status(fields.opt_text(STATUS_KEYS).as_deref());
    debug!(
        "Normalized {} status {:?} to {}",
        kind, normalized.token, normalized.status
    );

    match &normalized.status {
        SectionStatus::Ready => {
            let payload = fields
                .lookup(PAYLOAD_KEYS)
                .filter(|value| value.is_object() || value.is_array())
                .unwrap_or(envelope);
            let data = (kind.descriptor().map_payload)(&Fields::new(payload));
            Section::ready(data)
        }
        SectionStatus::Failed => Section::failed(
            fields
                .opt_text(MESSAGE_KEYS)
                .unwrap_or_else(|| status_message(&normalized, kind)),
        ),
        SectionStatus::NoMatches => Section::no_matches(Some(status_message(&normalized, kind))),
        other => Section::with_status(other.clone(), Some(status_message(&normalized, kind))),
    }
}

/// Converts a backend error into a terminal FAILED section.
pub fn failure_section(kind: SectionKind, error: &AnalysisError) -> Section {
    warn!("Analysis backend failed for {}: {}", kind, error);
    Section::failed(
        error
            .user_message()
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
    )
}

/// Normalizes the outcome of one backend call. Never fails.
pub fn normalize_response(kind: SectionKind, response: Result<Value, AnalysisError>) -> Section {
    match response {
        Ok(envelope) => normalize_payload(kind, &envelope),
        Err(error) => failure_section(kind, &error),
    }
}
