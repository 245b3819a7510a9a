//! Analysis backend client.
//!
//! The engine only needs `fetch_section(player, kind) -> raw payload | error`;
//! the payload is untrusted JSON and goes through the normalizer afterwards.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

use super::kinds::SectionKind;
use super::types::PlayerKey;

/// Errors raised while contacting the analysis backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Request to the analysis service failed: {0}")]
    Network(String),

    #[error("The analysis service did not respond in time")]
    Timeout,

    /// Non-2xx response. `message` is the backend's own explanation when the
    /// body carried one.
    #[error("The analysis service returned HTTP {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Http { status: u16, message: Option<String> },

    #[error("The analysis service returned an unreadable response: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Invalid analysis service URL: {0}")]
    InvalidUrl(String),
}

impl AnalysisError {
    /// Text suitable for a FAILED section. `None` when the error carries
    /// nothing more useful than the generic fallback.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AnalysisError::Http {
                message: Some(message),
                ..
            } => Some(message.clone()),
            AnalysisError::Http { message: None, .. } | AnalysisError::InvalidUrl(_) => None,
            AnalysisError::Unavailable(message) if message.trim().is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

/// The external collaborator that computes section payloads.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn fetch_section(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
    ) -> Result<Value, AnalysisError>;
}

// =============================================================================
// HTTP backend
// =============================================================================

/// `GET {base}/players/{player}/sections/{kind}` over reqwest.
pub struct HttpAnalysisBackend {
    client: Client,
    base_url: Url,
}

impl HttpAnalysisBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let base_url =
            Url::parse(base_url).map_err(|e| AnalysisError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AnalysisError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the section URL. The player key is percent-encoded as a single
    /// path segment, so keys like `Faker#KR1` survive intact.
    pub fn section_url(&self, player_key: &PlayerKey, kind: SectionKind) -> Result<Url, AnalysisError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AnalysisError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["players", player_key.as_str(), "sections", kind.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn fetch_section(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
    ) -> Result<Value, AnalysisError> {
        let url = self.section_url(player_key, kind)?;
        debug!("Analysis request: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else {
                AnalysisError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(AnalysisError::Unavailable(
                "The analysis service is temporarily unavailable.".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Http {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AnalysisError::InvalidPayload(e.to_string()))
    }
}

/// Pulls `detail` / `message` / `error` out of a JSON error body, or uses a
/// short plain-text body as-is.
fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["detail", "message", "error"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|value| value.as_str().map(str::trim).filter(|s| !s.is_empty()))
            .map(str::to_string),
        Ok(_) => None,
        Err(_) if trimmed.len() <= 200 && !trimmed.starts_with('<') => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpAnalysisBackend {
        HttpAnalysisBackend::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn section_url_appends_segments() {
        let player = PlayerKey::new("Faker#KR1").unwrap();
        let url = backend("http://localhost:8000/api/")
            .section_url(&player, SectionKind::RiskProfile)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/players/Faker%23KR1/sections/risk_profile"
        );
    }

    #[test]
    fn section_url_without_trailing_slash() {
        let player = PlayerKey::new("p1").unwrap();
        let url = backend("http://localhost:8000/api")
            .section_url(&player, SectionKind::Roles)
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/players/p1/sections/roles");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(HttpAnalysisBackend::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpAnalysisBackend::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn error_body_detail_is_extracted() {
        assert_eq!(
            error_message_from_body(r#"{"detail": "Player not found"}"#),
            Some("Player not found".to_string())
        );
        assert_eq!(error_message_from_body("rate limited"), Some("rate limited".to_string()));
        assert_eq!(error_message_from_body("<html>502</html>"), None);
        assert_eq!(error_message_from_body(""), None);
    }

    #[test]
    fn user_message_prefers_backend_text() {
        let err = AnalysisError::Http {
            status: 404,
            message: Some("Player not found".to_string()),
        };
        assert_eq!(err.user_message().as_deref(), Some("Player not found"));

        let bare = AnalysisError::Http {
            status: 500,
            message: None,
        };
        assert_eq!(bare.user_message(), None);
        assert!(AnalysisError::Timeout.user_message().is_some());
    }
}
