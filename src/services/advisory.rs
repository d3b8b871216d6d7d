//! Clarity Advisory
//!
//! Scores how unambiguous a claim text is before it is posted. Advisory
//! only: the score never gates creation.

use std::time::Duration;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::clock::Timestamp;
use crate::services::transport::TransportError;

/// Scores at or above this count as clear.
pub const CLARITY_THRESHOLD: u8 = 80;

/// Request body sent to a clarity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarityRequest {
    /// Claim under evaluation.
    pub claim_text: String,
    /// Claim deadline, unix seconds.
    pub deadline: Timestamp,
}

/// Reply from a clarity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarityScore {
    /// 0-100.
    pub clarity_score: u8,
}

impl ClarityScore {
    /// Whether the text is clear enough to post as-is.
    pub fn is_clear(&self) -> bool {
        self.clarity_score >= CLARITY_THRESHOLD
    }
}

/// Source of clarity scores.
#[async_trait]
pub trait ClarityAdvisor: Send + Sync {
    /// Score a prospective claim.
    async fn score(&self, claim_text: &str, deadline: Timestamp) -> Result<ClarityScore, TransportError>;
}

/// Clarity scores from an HTTP webhook.
pub struct WebhookClarityAdvisor {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookClarityAdvisor {
    /// Create an advisor posting to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("claim-wager/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { url: url.into(), http_client }
    }
}

#[async_trait]
impl ClarityAdvisor for WebhookClarityAdvisor {
    async fn score(&self, claim_text: &str, deadline: Timestamp) -> Result<ClarityScore, TransportError> {
        let body = ClarityRequest { claim_text: claim_text.to_string(), deadline };

        let response = self.http_client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let score: ClarityScore = response.json().await?;
        if score.clarity_score > 100 {
            return Err(TransportError::Malformed(format!("clarity score {} out of range", score.clarity_score)));
        }

        debug!("Clarity score {} for {} byte claim", score.clarity_score, claim_text.len());
        Ok(score)
    }
}

/// Advisor returning a fixed score.
#[derive(Debug, Clone, Copy)]
pub struct FixedClarityAdvisor(pub u8);

#[async_trait]
impl ClarityAdvisor for FixedClarityAdvisor {
    async fn score(&self, _claim_text: &str, _deadline: Timestamp) -> Result<ClarityScore, TransportError> {
        Ok(ClarityScore { clarity_score: self.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        assert!(!ClarityScore { clarity_score: 79 }.is_clear());
        assert!(ClarityScore { clarity_score: 80 }.is_clear());
    }

    #[test]
    fn test_reply_shape() {
        let score: ClarityScore = serde_json::from_str(r#"{"clarity_score": 92}"#).unwrap();
        assert_eq!(score.clarity_score, 92);
        assert!(serde_json::from_str::<ClarityScore>(r#"{"score": 92}"#).is_err());
    }

    #[tokio::test]
    async fn test_fixed_advisor() {
        let advisor = FixedClarityAdvisor(85);
        assert!(advisor.score("anything", 0).await.unwrap().is_clear());
    }

    #[tokio::test]
    async fn test_unreachable_webhook() {
        let advisor = WebhookClarityAdvisor::new("http://127.0.0.1:1/clarity", Duration::from_millis(500));
        let err = advisor.score("text", 0).await.unwrap_err();
        assert!(err.is_transient());
    }
}
