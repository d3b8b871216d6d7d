//! Network Layer
//!
//! Wire codec for instructions, the JSON message protocol, and the
//! WebSocket server and client that carry them. Nothing here decides
//! outcomes; every state change goes through `authority/`.

pub mod auth;
pub mod client;
pub mod instruction;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, Caller, CallerRole, validate_token, account_for_subject};
pub use client::RemoteAuthority;
pub use instruction::{DecodeError, EncodeError, Instruction, SCHEMA, SCHEMA_VERSION};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode, SubmitRequest};
pub use server::{AuthorityServer, ServerConfig, AuthorityServerError};
