//! Settlement Authority
//!
//! Owns the claim ledger and is the only writer to it. Submissions arrive
//! as encoded instructions; reads return copies.

pub mod executor;
pub mod ledger;
pub mod settlement;
pub mod view;

pub use executor::{ExecutionError, ProtocolConfig, Receipt, SettlementAuthority};
pub use ledger::{ClaimLedger, LedgerError};
pub use settlement::{AccountHandle, Settlement, SubmitError};
pub use view::{ClaimView, SideView};
