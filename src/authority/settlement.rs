//! Settlement capability.
//!
//! Everything outside the authority reaches it through a [`Settlement`]
//! handle bound to one account: [`AccountHandle`] in-process, or
//! `RemoteAuthority` over WebSocket.

use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;

use crate::authority::executor::{Receipt, SettlementAuthority};
use crate::authority::view::ClaimView;
use crate::core::account::{AccountId, ClaimId};
use crate::network::instruction::Instruction;
use crate::network::protocol::ErrorCode;
use crate::services::transport::TransportError;

/// Why a submission did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The authority refused it; nothing changed.
    #[error("rejected ({code:?}): {message}")]
    Rejected {
        /// Machine-readable reason.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },

    /// The authority could not be reached or replied badly.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubmitError {
    /// Rejection code, if the authority answered.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            SubmitError::Rejected { code, .. } => Some(*code),
            SubmitError::Transport(_) => None,
        }
    }
}

/// Access to the settlement authority on behalf of one account.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Account submissions are made as.
    fn account(&self) -> AccountId;

    /// Submit one instruction.
    async fn submit(&self, claim_id: Option<ClaimId>, instruction: &Instruction) -> Result<Receipt, SubmitError>;

    /// Fetch one claim.
    async fn claim(&self, id: ClaimId) -> Result<Option<ClaimView>, SubmitError>;

    /// Fetch every claim.
    async fn claims(&self) -> Result<Vec<ClaimView>, SubmitError>;
}

/// In-process handle onto a shared authority.
#[derive(Clone)]
pub struct AccountHandle {
    authority: Arc<SettlementAuthority>,
    account: AccountId,
}

impl AccountHandle {
    /// Bind `account` to `authority`.
    pub fn new(authority: Arc<SettlementAuthority>, account: AccountId) -> Self {
        Self { authority, account }
    }
}

#[async_trait]
impl Settlement for AccountHandle {
    fn account(&self) -> AccountId {
        self.account
    }

    async fn submit(&self, claim_id: Option<ClaimId>, instruction: &Instruction) -> Result<Receipt, SubmitError> {
        let bytes = instruction.encode().map_err(|e| SubmitError::Rejected {
            code: ErrorCode::InvalidInput,
            message: e.to_string(),
        })?;

        self.authority
            .execute(self.account, claim_id, &bytes)
            .await
            .map_err(|e| SubmitError::Rejected {
                code: (&e).into(),
                message: e.to_string(),
            })
    }

    async fn claim(&self, id: ClaimId) -> Result<Option<ClaimView>, SubmitError> {
        Ok(self.authority.claim(&id).await.as_ref().map(ClaimView::from_claim))
    }

    async fn claims(&self) -> Result<Vec<ClaimView>, SubmitError> {
        Ok(self.authority.claims().await.iter().map(ClaimView::from_claim).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::executor::ProtocolConfig;
    use crate::core::clock::ManualClock;
    use crate::protocol::pool::Side;

    #[tokio::test]
    async fn test_handle_submits_as_account() {
        let clock = Arc::new(ManualClock::new(1_000));
        let authority = Arc::new(SettlementAuthority::new(&ProtocolConfig::default(), clock));

        let creator = AccountHandle::new(authority.clone(), AccountId::new([1; 32]));
        let create = Instruction::CreateClaim {
            claim_text: "Team A wins the final".to_string(),
            deadline: 2_000,
            stake: 25,
            category: "sports".to_string(),
            subcategory: "football".to_string(),
        };
        let receipt = creator.submit(None, &create).await.unwrap();

        let view = creator.claim(receipt.claim_id).await.unwrap().unwrap();
        assert_eq!(view.creator, creator.account());
        assert_eq!(view.side_a.total, 25);
        assert_eq!(view.state_hash, receipt.state_hash);

        let bettor = AccountHandle::new(authority, AccountId::new([2; 32]));
        let err = bettor
            .submit(Some(receipt.claim_id), &Instruction::JoinPool { side: Side::B, amount: 0 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidAmount));

        assert_eq!(bettor.claims().await.unwrap().len(), 1);
    }
}
