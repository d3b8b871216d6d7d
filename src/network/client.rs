//! Remote Authority Client
//!
//! [`Settlement`] over the authority's WebSocket API. One request is in
//! flight at a time and every reply is matched on its request id, so a
//! late answer to a timed-out request is skipped like a pushed event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use crate::authority::executor::Receipt;
use crate::authority::settlement::{Settlement, SubmitError};
use crate::authority::view::ClaimView;
use crate::core::account::{AccountId, ClaimId};
use crate::network::instruction::Instruction;
use crate::network::protocol::{AuthRequest, ClientMessage, ErrorCode, ServerMessage, SubmitRequest};
use crate::services::transport::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Authenticated connection to a remote authority.
pub struct RemoteAuthority {
    stream: Mutex<WsStream>,
    account: AccountId,
    next_request: AtomicU64,
    timeout: Duration,
}

impl RemoteAuthority {
    /// Connect to `url` and authenticate with `token`.
    pub async fn connect(url: &str, token: &str, timeout: Duration) -> Result<Self, TransportError> {
        let (mut stream, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let auth = ClientMessage::Auth(AuthRequest {
            token: token.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        stream.send(Message::Text(auth.to_json()?)).await?;

        let reply = tokio::time::timeout(timeout, next_reply(&mut stream))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let result = match reply {
            ServerMessage::AuthResult(result) => result,
            ServerMessage::Error(e) => return Err(TransportError::Unreachable(e.message)),
            other => return Err(TransportError::Malformed(format!("expected auth result, got {:?}", other))),
        };
        if !result.success {
            return Err(TransportError::AuthRefused(result.error.unwrap_or_default()));
        }

        let account = result
            .account_id
            .as_deref()
            .and_then(AccountId::from_hex)
            .ok_or_else(|| TransportError::Malformed("auth result without account".to_string()))?;

        info!("Connected to {} as {}", url, account.short());
        Ok(Self {
            stream: Mutex::new(stream),
            account,
            next_request: AtomicU64::new(1),
            timeout,
        })
    }

    /// Send one message and wait for the reply `accept` recognises.
    async fn request<T>(
        &self,
        msg: ClientMessage,
        accept: impl Fn(ServerMessage) -> Option<Result<T, SubmitError>>,
    ) -> Result<T, SubmitError> {
        let mut stream = self.stream.lock().await;
        stream
            .send(Message::Text(msg.to_json().map_err(TransportError::from)?))
            .await
            .map_err(TransportError::from)?;

        let wait = async {
            loop {
                let reply = next_reply(&mut stream).await?;
                if let Some(result) = accept(reply) {
                    return result;
                }
            }
        };

        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| SubmitError::Transport(TransportError::Timeout))?
    }

    fn next_request_id(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.stream.lock().await.close(None).await?;
        Ok(())
    }
}

/// Read until a reply arrives, skipping pushed events.
async fn next_reply(stream: &mut WsStream) -> Result<ServerMessage, TransportError> {
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => match ServerMessage::from_json(&text)? {
                ServerMessage::Event(event) => {
                    trace!("Skipping pushed event {}", event.label());
                }
                ServerMessage::Shutdown { reason } => {
                    debug!("Authority shutting down: {}", reason);
                    return Err(TransportError::Closed);
                }
                reply => return Ok(reply),
            },
            Message::Close(_) => return Err(TransportError::Closed),
            _ => {}
        }
    }
    Err(TransportError::Closed)
}

/// A bare `Error` reply answers whatever request is outstanding.
fn as_rejection<T>(msg: &ServerMessage) -> Option<Result<T, SubmitError>> {
    match msg {
        ServerMessage::Error(e) => Some(Err(SubmitError::Rejected {
            code: e.code,
            message: e.message.clone(),
        })),
        _ => None,
    }
}

#[async_trait]
impl Settlement for RemoteAuthority {
    fn account(&self) -> AccountId {
        self.account
    }

    async fn submit(&self, claim_id: Option<ClaimId>, instruction: &Instruction) -> Result<Receipt, SubmitError> {
        let bytes = instruction.encode().map_err(|e| SubmitError::Rejected {
            code: ErrorCode::InvalidInput,
            message: e.to_string(),
        })?;
        let request_id = self.next_request_id();
        let msg = ClientMessage::Submit(SubmitRequest {
            request_id,
            claim_id,
            instruction: hex::encode(bytes),
        });

        self.request(msg, |reply| match reply {
            ServerMessage::Confirmed { request_id: id, receipt } if id == request_id => Some(Ok(receipt)),
            ServerMessage::Rejected { request_id: id, code, message } if id == request_id => {
                Some(Err(SubmitError::Rejected { code, message }))
            }
            other => as_rejection(&other),
        })
        .await
    }

    async fn claim(&self, id: ClaimId) -> Result<Option<ClaimView>, SubmitError> {
        let request_id = self.next_request_id();
        self.request(ClientMessage::GetClaim { request_id, claim_id: id }, |reply| match reply {
            ServerMessage::Claim { request_id: rid, claim } if rid == request_id => Some(Ok(claim)),
            other => as_rejection(&other),
        })
        .await
    }

    async fn claims(&self) -> Result<Vec<ClaimView>, SubmitError> {
        let request_id = self.next_request_id();
        self.request(ClientMessage::ListClaims { request_id }, |reply| match reply {
            ServerMessage::Claims { request_id: rid, claims } if rid == request_id => Some(Ok(claims)),
            other => as_rejection(&other),
        })
        .await
    }
}
