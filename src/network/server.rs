//! WebSocket Authority Server
//!
//! Async WebSocket front for the settlement authority. Handles
//! authentication, instruction submission, claim reads and clarity checks,
//! and pushes every committed event to connected clients.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::authority::executor::SettlementAuthority;
use crate::authority::view::ClaimView;
use crate::network::auth::{validate_token, AuthConfig, AuthError, Caller};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClarityResult, ClientMessage, ErrorCode, ServerMessage, SubmitRequest,
};
use crate::services::advisory::ClarityAdvisor;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("SERVER_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("SERVER_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: std::env::var("SERVER_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            version: defaults.version,
        }
    }
}

/// Authority server errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state. The entry lives exactly as long as its
/// connection task.
struct ConnectedClient {
    /// Set by a successful auth.
    caller: Option<Caller>,
    /// Last activity.
    last_activity: Instant,
    /// Asks the connection task to close; taken once fired.
    close: Option<oneshot::Sender<()>>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// State shared by every connection task.
#[derive(Clone)]
struct Shared {
    config: ServerConfig,
    auth: Arc<AuthConfig>,
    authority: Arc<SettlementAuthority>,
    advisor: Option<Arc<dyn ClarityAdvisor>>,
    clients: Clients,
}

/// The authority server.
pub struct AuthorityServer {
    shared: Shared,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl AuthorityServer {
    /// Create a new server in front of `authority`.
    pub fn new(config: ServerConfig, auth: AuthConfig, authority: Arc<SettlementAuthority>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Shared {
                config,
                auth: Arc::new(auth),
                authority,
                advisor: None,
                clients: Arc::new(RwLock::new(BTreeMap::new())),
            },
            shutdown_tx,
        }
    }

    /// Answer `CheckClarity` with this advisor.
    pub fn with_advisor(mut self, advisor: Arc<dyn ClarityAdvisor>) -> Self {
        self.shared.advisor = Some(advisor);
        self
    }

    /// Bind the configured address and serve.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), AuthorityServerError> {
        let listener = TcpListener::bind(&self.shared.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), AuthorityServerError> {
        info!("Authority server listening on {}", listener.local_addr()?);

        let cleanup_clients = self.shared.clients.clone();
        let idle_timeout = self.shared.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.shared.clients.read().await.len();
                            if clients_count >= self.shared.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(Self::reject_overloaded(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Tell a client over the limit why it is being turned away.
    async fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
        let mut ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("Handshake with rejected client {} failed: {}", addr, e);
                return;
            }
        };
        let reply = ServerMessage::error(ErrorCode::ServerOverloaded, "connection limit reached");
        if let Ok(text) = reply.to_json() {
            let _ = ws.send(Message::Text(text)).await;
        }
        let _ = ws.close(None).await;
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let shared = self.shared.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut events_rx = shared.authority.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            let (close_tx, mut close_rx) = oneshot::channel();
            shared.clients.write().await.insert(addr, ConnectedClient {
                caller: None,
                last_activity: Instant::now(),
                close: Some(close_tx),
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                if let Some(client) = shared.clients.write().await.get_mut(&addr) {
                                    client.last_activity = Instant::now();
                                }

                                let reply = Self::handle_client_message(addr, client_msg, &shared).await;
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    event = events_rx.recv() => {
                        match event {
                            Ok(event) => {
                                let _ = msg_tx.send(ServerMessage::Event(event)).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Client {} lagged, {} events dropped", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = &mut close_rx => {
                        info!("Closing idle client {}", addr);
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "idle timeout".to_string(),
                        }).await;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies drain before closing.
            drop(msg_tx);
            let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

            shared.clients.write().await.remove(&addr);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message and produce its reply.
    async fn handle_client_message(addr: SocketAddr, msg: ClientMessage, shared: &Shared) -> ServerMessage {
        match msg {
            ClientMessage::Auth(auth) => Self::handle_auth(addr, auth, shared).await,
            ClientMessage::Submit(req) => Self::handle_submit(addr, req, shared).await,
            ClientMessage::GetClaim { request_id, claim_id } => {
                let claim = shared.authority.claim(&claim_id).await;
                ServerMessage::Claim { request_id, claim: claim.as_ref().map(ClaimView::from_claim) }
            }
            ClientMessage::ListClaims { request_id } => {
                let claims = shared.authority.claims().await;
                ServerMessage::Claims { request_id, claims: claims.iter().map(ClaimView::from_claim).collect() }
            }
            ClientMessage::CheckClarity { claim_text, deadline } => {
                let Some(advisor) = shared.advisor.as_ref() else {
                    return ServerMessage::error(ErrorCode::Unavailable, "clarity advisor not configured");
                };
                match advisor.score(&claim_text, deadline).await {
                    Ok(score) => ServerMessage::Clarity(ClarityResult {
                        clarity_score: score.clarity_score,
                        clear: score.is_clear(),
                    }),
                    Err(e) => {
                        warn!("Clarity check failed for {}: {}", addr, e);
                        ServerMessage::error(ErrorCode::Unavailable, e.to_string())
                    }
                }
            }
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
            },
        }
    }

    /// Handle authentication.
    async fn handle_auth(addr: SocketAddr, auth: AuthRequest, shared: &Shared) -> ServerMessage {
        let verified = validate_token(&auth.token, &shared.auth)
            .and_then(|caller| caller.check_role(shared.authority.engine()).map(|_| caller));

        match verified {
            Ok(caller) => {
                if let Some(client) = shared.clients.write().await.get_mut(&addr) {
                    client.caller = Some(caller);
                }
                info!(
                    "Client {} authenticated as {} ({}), client version {:?}",
                    addr,
                    caller.account.short(),
                    caller.role,
                    auth.client_version
                );

                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    account_id: Some(caller.account.to_hex()),
                    code: None,
                    error: None,
                    server_version: shared.config.version.clone(),
                })
            }
            Err(e) => {
                match &e {
                    AuthError::NotConfigured => {
                        error!("Auth attempt from {} but authentication is not configured", addr)
                    }
                    AuthError::RoleNotGranted(role) => warn!("Client {} claimed unregistered role {}", addr, role),
                    _ => debug!("Auth failed for {}: {}", addr, e),
                }

                ServerMessage::AuthResult(AuthResult {
                    success: false,
                    account_id: None,
                    code: Some((&e).into()),
                    error: Some(e.to_string()),
                    server_version: shared.config.version.clone(),
                })
            }
        }
    }

    /// Handle an instruction submission.
    async fn handle_submit(addr: SocketAddr, req: SubmitRequest, shared: &Shared) -> ServerMessage {
        let account = shared.clients.read().await.get(&addr).and_then(|c| c.caller).map(|c| c.account);
        let Some(account) = account else {
            return ServerMessage::Rejected {
                request_id: req.request_id,
                code: ErrorCode::NotAuthenticated,
                message: "Must authenticate first".to_string(),
            };
        };

        let bytes = match hex::decode(&req.instruction) {
            Ok(bytes) => bytes,
            Err(e) => {
                return ServerMessage::Rejected {
                    request_id: req.request_id,
                    code: ErrorCode::InvalidInput,
                    message: format!("instruction is not hex: {}", e),
                };
            }
        };

        match shared.authority.execute(account, req.claim_id, &bytes).await {
            Ok(receipt) => ServerMessage::Confirmed { request_id: req.request_id, receipt },
            Err(e) => ServerMessage::Rejected {
                request_id: req.request_id,
                code: (&e).into(),
                message: e.to_string(),
            },
        }
    }

    /// Periodically close connections idle longer than `idle_timeout`.
    async fn run_cleanup_loop(clients: Clients, idle_timeout: Duration) {
        let period = idle_timeout.clamp(Duration::from_millis(10), Duration::from_secs(60));
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            let closed = Self::sweep_idle(&clients, idle_timeout, Instant::now()).await;
            if closed > 0 {
                debug!("Asked {} idle clients to close", closed);
            }
        }
    }

    /// Signal every client idle at `now` to close. Entries stay until
    /// their connection task exits, so an open socket never loses its
    /// session.
    async fn sweep_idle(clients: &Clients, idle_timeout: Duration, now: Instant) -> usize {
        let mut clients = clients.write().await;
        let mut closed = 0;
        for client in clients.values_mut() {
            if now.saturating_duration_since(client.last_activity) <= idle_timeout {
                continue;
            }
            if let Some(close) = client.close.take() {
                let _ = close.send(());
                closed += 1;
            }
        }
        closed
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use crate::authority::executor::ProtocolConfig;
    use crate::core::clock::SystemClock;
    use crate::network::auth::account_for_subject;

    const SECRET: &str = "server-test-secret";

    fn server_with(config: ServerConfig, protocol: ProtocolConfig) -> AuthorityServer {
        let authority = Arc::new(SettlementAuthority::new(&protocol, Arc::new(SystemClock)));
        let auth = AuthConfig { secret: Some(SECRET.to_string()), ..Default::default() };
        AuthorityServer::new(config, auth, authority)
    }

    fn server() -> AuthorityServer {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        };
        server_with(config, ProtocolConfig::default())
    }

    fn token(sub: &str, role: &str) -> String {
        let claims = serde_json::json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + 3600,
            "role": role,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn authenticated(server: &AuthorityServer, addr: SocketAddr) -> oneshot::Receiver<()> {
        let (close_tx, close_rx) = oneshot::channel();
        server.shared.clients.write().await.insert(addr, ConnectedClient {
            caller: None,
            last_activity: Instant::now(),
            close: Some(close_tx),
        });
        let auth = AuthRequest { token: token("bettor-1", "bettor"), client_version: "test".into() };
        let reply = AuthorityServer::handle_auth(addr, auth, &server.shared).await;
        assert!(matches!(reply, ServerMessage::AuthResult(ref r) if r.success));
        close_rx
    }

    async fn listen(server: &Arc<AuthorityServer>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        url
    }

    async fn next_server_message<S>(ws: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return ServerMessage::from_json(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {:?}", other),
            }
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server();
        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_reads_without_auth() {
        let server = server();
        let addr = SocketAddr::from(([127, 0, 0, 1], 1));

        let list = ClientMessage::ListClaims { request_id: 4 };
        let reply = AuthorityServer::handle_client_message(addr, list, &server.shared).await;
        assert!(matches!(reply, ServerMessage::Claims { request_id: 4, ref claims } if claims.is_empty()));

        let reply = AuthorityServer::handle_client_message(
            addr,
            ClientMessage::CheckClarity { claim_text: "x".into(), deadline: 0 },
            &server.shared,
        )
        .await;
        assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == ErrorCode::Unavailable));
    }

    #[tokio::test]
    async fn test_submit_requires_auth() {
        let server = server();
        let addr = SocketAddr::from(([127, 0, 0, 1], 1));
        let req = SubmitRequest { request_id: 9, claim_id: None, instruction: "03".into() };

        let reply = AuthorityServer::handle_submit(addr, req, &server.shared).await;
        assert!(matches!(
            reply,
            ServerMessage::Rejected { request_id: 9, code: ErrorCode::NotAuthenticated, .. }
        ));
    }

    #[tokio::test]
    async fn test_idle_sweep_keeps_session_until_close() {
        let server = server();
        let addr = SocketAddr::from(([127, 0, 0, 1], 2));
        let mut close_rx = authenticated(&server, addr).await;

        let later = Instant::now() + Duration::from_secs(1);
        let closed = AuthorityServer::sweep_idle(&server.shared.clients, Duration::ZERO, later).await;
        assert_eq!(closed, 1);
        assert!(close_rx.try_recv().is_ok());

        // Still registered and authenticated while the socket is open.
        assert_eq!(server.connection_count().await, 1);
        let req = SubmitRequest { request_id: 3, claim_id: None, instruction: "03".into() };
        let reply = AuthorityServer::handle_submit(addr, req, &server.shared).await;
        assert!(matches!(
            reply,
            ServerMessage::Rejected { request_id: 3, code: ErrorCode::MissingClaimId, .. }
        ));

        // A second sweep does not signal twice.
        let closed = AuthorityServer::sweep_idle(&server.shared.clients, Duration::ZERO, later).await;
        assert_eq!(closed, 0);
    }

    #[tokio::test]
    async fn test_idle_sweep_spares_active_clients() {
        let server = server();
        let addr = SocketAddr::from(([127, 0, 0, 1], 3));
        let mut close_rx = authenticated(&server, addr).await;

        let closed = AuthorityServer::sweep_idle(&server.shared.clients, Duration::from_secs(60), Instant::now()).await;
        assert_eq!(closed, 0);
        assert!(close_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = ServerConfig { idle_timeout: Duration::from_millis(50), ..Default::default() };
        let server = Arc::new(server_with(config, ProtocolConfig::default()));
        let url = listen(&server).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(2), next_server_message(&mut ws)).await.unwrap();
        assert!(matches!(msg, ServerMessage::Shutdown { ref reason } if reason == "idle timeout"));

        tokio::time::timeout(Duration::from_secs(2), async {
            while server.connection_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        server.shutdown();
    }

    #[tokio::test]
    async fn test_over_limit_connection_told_why() {
        let config = ServerConfig { max_connections: 0, ..Default::default() };
        let server = Arc::new(server_with(config, ProtocolConfig::default()));
        let url = listen(&server).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(2), next_server_message(&mut ws)).await.unwrap();
        assert!(matches!(msg, ServerMessage::Error(ref e) if e.code == ErrorCode::ServerOverloaded));
        assert_eq!(server.connection_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_auth_failures_carry_codes() {
        let judge = account_for_subject("judge");
        let protocol = ProtocolConfig { arbiters: vec![judge], ..Default::default() };
        let server = server_with(ServerConfig::default(), protocol);
        let addr = SocketAddr::from(([127, 0, 0, 1], 4));

        let auth = |token: String| AuthRequest { token, client_version: "test".into() };
        let code = |reply: ServerMessage| match reply {
            ServerMessage::AuthResult(r) => (r.success, r.code),
            other => panic!("Wrong message type: {:?}", other),
        };

        let reply = AuthorityServer::handle_auth(addr, auth(token("judge", "arbiter")), &server.shared).await;
        assert_eq!(code(reply), (true, None));

        let reply = AuthorityServer::handle_auth(addr, auth(token("bettor-1", "arbiter")), &server.shared).await;
        assert_eq!(code(reply), (false, Some(ErrorCode::AuthFailed)));

        let reply = AuthorityServer::handle_auth(addr, auth("not-a-jwt".into()), &server.shared).await;
        assert_eq!(code(reply), (false, Some(ErrorCode::InvalidToken)));

        let expired = encode(
            &Header::default(),
            &serde_json::json!({ "sub": "bettor-1", "exp": 1 }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let reply = AuthorityServer::handle_auth(addr, auth(expired), &server.shared).await;
        assert_eq!(code(reply), (false, Some(ErrorCode::TokenExpired)));

    }
}
