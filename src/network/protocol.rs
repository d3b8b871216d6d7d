//! Protocol Messages
//!
//! JSON envelope for client-authority communication over WebSocket.
//! Instruction bytes travel hex-encoded inside `Submit`; everything else is
//! plain JSON.

use serde::{Serialize, Deserialize};

use crate::authority::executor::{ExecutionError, Receipt};
use crate::authority::view::ClaimView;
use crate::core::account::ClaimId;
use crate::network::auth::AuthError;
use crate::network::instruction::DecodeError;
use crate::protocol::error::ProtocolError;
use crate::protocol::events::ClaimEvent;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT.
    Auth(AuthRequest),

    /// Submit an encoded instruction.
    Submit(SubmitRequest),

    /// Fetch one claim.
    GetClaim {
        /// Correlation id, echoed in the reply.
        #[serde(default)]
        request_id: u64,
        /// Claim to fetch.
        claim_id: ClaimId,
    },

    /// Fetch every claim.
    ListClaims {
        /// Correlation id, echoed in the reply.
        #[serde(default)]
        request_id: u64,
    },

    /// Ask the clarity advisor to score a claim text.
    CheckClarity {
        /// Statement to score.
        claim_text: String,
        /// Intended deadline, unix seconds.
        deadline: i64,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client send time, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT from the identity provider.
    pub token: String,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

/// Instruction submission envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Client-chosen correlation id, echoed in the reply.
    pub request_id: u64,
    /// Target claim; absent for `CreateClaim`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<ClaimId>,
    /// Hex-encoded instruction bytes.
    pub instruction: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Instruction committed.
    Confirmed {
        /// Id of the `Submit` this answers.
        request_id: u64,
        /// What the commit did.
        receipt: Receipt,
    },

    /// Instruction refused; nothing changed.
    Rejected {
        /// Id of the `Submit` this answers.
        request_id: u64,
        /// Machine-readable reason.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },

    /// Reply to `GetClaim`.
    Claim {
        /// Id of the request this answers.
        #[serde(default)]
        request_id: u64,
        /// The claim, if it exists.
        claim: Option<ClaimView>,
    },

    /// Reply to `ListClaims`.
    Claims {
        /// Id of the request this answers.
        #[serde(default)]
        request_id: u64,
        /// Every claim, in id order.
        claims: Vec<ClaimView>,
    },

    /// Reply to `CheckClarity`.
    Clarity(ClarityResult),

    /// Committed event on any claim.
    Event(ClaimEvent),

    /// Pong response.
    Pong {
        /// The ping's timestamp.
        timestamp: u64,
        /// Server clock, unix millis.
        server_time: u64,
    },

    /// Error not tied to a submission.
    Error(ServerError),

    /// Server is closing this connection.
    Shutdown {
        /// Why, e.g. shutdown or idle timeout.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Hex account id derived from the token subject.
    pub account_id: Option<String>,
    /// Error code if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Clarity advisory result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarityResult {
    /// Score 0-100.
    pub clarity_score: u8,
    /// Score meets the clarity threshold.
    pub clear: bool,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Invalid input.
    InvalidInput,
    /// Instruction bytes ended early.
    TruncatedInput,
    /// First instruction byte names no operation.
    UnknownDiscriminator,
    /// An enum-like field byte is out of range.
    InvalidFieldValue,
    /// A string field is not UTF-8.
    InvalidUtf8,
    /// Bytes left over after the record.
    TrailingBytes,
    /// Deadline not after the current time.
    InvalidDeadline,
    /// Zero creator stake.
    InvalidStake,
    /// Zero wager.
    InvalidAmount,
    /// Claim text empty or too long.
    InvalidClaimText,
    /// Pool is closed to wagers.
    ClaimLocked,
    /// Lock attempted before the deadline.
    DeadlineNotReached,
    /// Confidence above 100.
    InvalidConfidence,
    /// Nothing left to pay this account.
    AlreadyPaid,
    /// Account holds no winning stake.
    NotAWinner,
    /// Caller lacks the role for this verdict.
    AuthorityMismatch,
    /// Payout before the claim resolved.
    NotResolved,
    /// Operation not valid in the claim's status.
    InvalidTransition,
    /// Only a human verdict settles a disputed claim.
    HumanVerdictRequired,
    /// Dispute re-entries used up.
    DisputeLimitReached,
    /// No such claim.
    ClaimNotFound,
    /// Claim id already taken.
    ClaimExists,
    /// Instruction needs a target claim.
    MissingClaimId,
    /// Amount arithmetic overflowed.
    ArithmeticOverflow,
    /// Vault cannot cover the payout.
    VaultExhausted,
    /// Collaborator not configured or unreachable.
    Unavailable,
    /// Connection limit reached.
    ServerOverloaded,
}

impl From<&ProtocolError> for ErrorCode {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidDeadline { .. } => ErrorCode::InvalidDeadline,
            ProtocolError::InvalidStake => ErrorCode::InvalidStake,
            ProtocolError::InvalidAmount => ErrorCode::InvalidAmount,
            ProtocolError::EmptyClaimText | ProtocolError::ClaimTextTooLong { .. } => ErrorCode::InvalidClaimText,
            ProtocolError::ClaimLocked => ErrorCode::ClaimLocked,
            ProtocolError::DeadlineNotReached { .. } => ErrorCode::DeadlineNotReached,
            ProtocolError::InvalidConfidence(_) => ErrorCode::InvalidConfidence,
            ProtocolError::AlreadyPaid => ErrorCode::AlreadyPaid,
            ProtocolError::NotAWinner => ErrorCode::NotAWinner,
            ProtocolError::AuthorityMismatch => ErrorCode::AuthorityMismatch,
            ProtocolError::NotResolved => ErrorCode::NotResolved,
            ProtocolError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            ProtocolError::HumanVerdictRequired => ErrorCode::HumanVerdictRequired,
            ProtocolError::DisputeLimitReached => ErrorCode::DisputeLimitReached,
            ProtocolError::ClaimNotFound => ErrorCode::ClaimNotFound,
            ProtocolError::ClaimExists => ErrorCode::ClaimExists,
            ProtocolError::MissingClaimId => ErrorCode::MissingClaimId,
            ProtocolError::ArithmeticOverflow => ErrorCode::ArithmeticOverflow,
            ProtocolError::VaultExhausted => ErrorCode::VaultExhausted,
        }
    }
}

impl From<&DecodeError> for ErrorCode {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::TruncatedInput { .. } => ErrorCode::TruncatedInput,
            DecodeError::UnknownDiscriminator(_) => ErrorCode::UnknownDiscriminator,
            DecodeError::InvalidFieldValue { .. } => ErrorCode::InvalidFieldValue,
            DecodeError::InvalidUtf8 { .. } => ErrorCode::InvalidUtf8,
            DecodeError::TrailingBytes(_) => ErrorCode::TrailingBytes,
        }
    }
}

impl From<&AuthError> for ErrorCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::NotConfigured | AuthError::RoleNotGranted(_) => ErrorCode::AuthFailed,
            _ => ErrorCode::InvalidToken,
        }
    }
}

impl From<&ExecutionError> for ErrorCode {
    fn from(err: &ExecutionError) -> Self {
        match err {
            ExecutionError::Decode(e) => e.into(),
            ExecutionError::Protocol(e) => e.into(),
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error reply helper.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }
}
