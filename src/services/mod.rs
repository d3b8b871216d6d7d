//! External collaborators.
//!
//! Clarity scoring and verdict sourcing live outside the authority and are
//! reached over HTTP. Both sit behind traits so tests can substitute fixed
//! answers.

pub mod advisory;
pub mod transport;
pub mod verdict;

pub use advisory::{ClarityAdvisor, ClarityScore, FixedClarityAdvisor, WebhookClarityAdvisor, CLARITY_THRESHOLD};
pub use transport::TransportError;
pub use verdict::{FixedResolutionSource, ResolutionSource, SourcedVerdict, WebhookResolutionSource};
