//! Verdict Sourcing
//!
//! Fetches an automated verdict for a claim whose deadline has passed.

use std::time::Duration;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::clock::Timestamp;
use crate::protocol::resolution::MAX_CONFIDENCE;
use crate::services::transport::TransportError;

/// Request body sent to a verdict service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRequest {
    /// Claim under evaluation.
    pub claim_text: String,
    /// Claim deadline, unix seconds.
    pub deadline: Timestamp,
}

/// Reply from a verdict service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedVerdict {
    /// Claim judged true.
    pub verdict: bool,
    /// 0-100.
    pub confidence: u8,
    /// Content id of supporting evidence.
    #[serde(default)]
    pub evidence_cid: Option<String>,
    /// Short explanation.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Source of automated verdicts.
#[async_trait]
pub trait ResolutionSource: Send + Sync {
    /// Judge a claim.
    async fn fetch(&self, claim_text: &str, deadline: Timestamp) -> Result<SourcedVerdict, TransportError>;
}

/// Verdicts from an HTTP webhook.
pub struct WebhookResolutionSource {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookResolutionSource {
    /// Create a source posting to `url`.
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
impl ResolutionSource for WebhookResolutionSource {
    async fn fetch(&self, claim_text: &str, deadline: Timestamp) -> Result<SourcedVerdict, TransportError> {
        let body = VerdictRequest { claim_text: claim_text.to_string(), deadline };

        let response = self.http_client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let verdict: SourcedVerdict = response.json().await?;
        if verdict.confidence > MAX_CONFIDENCE {
            return Err(TransportError::Malformed(format!("confidence {} out of range", verdict.confidence)));
        }

        debug!(
            "Sourced verdict {} at {}% (evidence {:?})",
            verdict.verdict, verdict.confidence, verdict.evidence_cid
        );
        Ok(verdict)
    }
}

/// Source returning the same verdict for every claim.
#[derive(Debug, Clone)]
pub struct FixedResolutionSource {
    verdict: SourcedVerdict,
}

impl FixedResolutionSource {
    /// Always answer `verdict` at `confidence`.
    pub fn new(verdict: bool, confidence: u8) -> Self {
        Self {
            verdict: SourcedVerdict { verdict, confidence, evidence_cid: None, reason: None },
        }
    }
}

#[async_trait]
impl ResolutionSource for FixedResolutionSource {
    async fn fetch(&self, _claim_text: &str, _deadline: Timestamp) -> Result<SourcedVerdict, TransportError> {
        Ok(self.verdict.clone())
    }
}
