//! Connection upgrader and endpoint registrar.
//!
//! A [`Server`] owns one TCP listener and a table of endpoints. Every
//! accepted connection is upgraded on its own task and, if the request
//! names a registered path, handed to a [`Session`] driven by that path's
//! handler.
//!
//! # Handshake
//!
//! | Check | Failure |
//! |-------|---------|
//! | Path registered | `404 Not Found` |
//! | `Origin` allowed by policy | `403 Forbidden` |
//! | RFC 6455 upgrade | Connection dropped |
//!
//! Rejected requests never create a session. The identity is taken from
//! the configured header (first comma-separated entry), falling back to
//! the peer IP.
//!
//! # Example
//!
//! ```ignore
//! use activity_pump::{Server, UpgraderConfig};
//!
//! let server = Server::builder()
//!     .config(UpgraderConfig::new())
//!     .endpoint("/rewards", rewards_handler)
//!     .bind("0.0.0.0:8080")
//!     .await?;
//!
//! println!("listening on {}", server.ws_url("/rewards"));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::UpgraderConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::identifiers::SessionId;
use crate::protocol::QueryParams;

use super::session::{Session, SessionHandle, SessionStatus};

// ============================================================================
// Types
// ============================================================================

type Endpoints = FxHashMap<String, Arc<dyn Handler>>;

/// Outcome of a successful handshake callback.
struct Route {
    handler: Arc<dyn Handler>,
    identity: String,
    query: QueryParams,
}

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: UpgraderConfig,
    endpoints: Endpoints,
}

impl ServerBuilder {
    /// Creates a builder with default configuration and no endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upgrader configuration.
    #[must_use]
    pub fn config(mut self, config: UpgraderConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers `handler` for `path`.
    ///
    /// A later registration for the same path wins.
    #[must_use]
    pub fn endpoint(mut self, path: impl AsRef<str>, handler: impl Handler) -> Self {
        self.endpoints
            .insert(normalize_path(path.as_ref()), Arc::new(handler));
        self
    }

    /// Validates the configuration, binds `addr` and starts accepting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<Arc<Server>> {
        self.config.validate()?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, _) = watch::channel(false);

        let server = Arc::new(Server {
            config: Arc::new(self.config),
            endpoints: RwLock::new(self.endpoints),
            sessions: RwLock::new(FxHashMap::default()),
            local_addr,
            shutdown,
        });

        let accepting = Arc::clone(&server);
        tokio::spawn(async move {
            accepting.accept_loop(listener).await;
        });

        info!(
            %local_addr,
            endpoints = server.endpoint_count(),
            "WebSocket server started"
        );

        Ok(server)
    }
}

// ============================================================================
// Server
// ============================================================================

/// WebSocket server routing upgraded connections to handlers by path.
///
/// Thread-safe; endpoints may be registered while the server is running.
pub struct Server {
    /// Shared, read-only upgrader settings.
    config: Arc<UpgraderConfig>,

    /// Handlers by request path.
    endpoints: RwLock<Endpoints>,

    /// Live sessions.
    sessions: RwLock<FxHashMap<SessionId, SessionHandle>>,

    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Set once to stop the accept loop.
    shutdown: watch::Sender<bool>,
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds `addr` with default configuration and no endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Arc<Self>> {
        ServerBuilder::new().bind(addr).await
    }

    /// Binds `handler` to `path`, replacing any previous handler.
    ///
    /// Sessions already running keep the handler they started with.
    pub fn register_endpoint(&self, path: impl AsRef<str>, handler: impl Handler) {
        let path = normalize_path(path.as_ref());
        let replaced = self
            .endpoints
            .write()
            .insert(path.clone(), Arc::new(handler))
            .is_some();

        if replaced {
            info!(%path, "Endpoint handler replaced");
        } else {
            debug!(%path, "Endpoint registered");
        }
    }

    /// Returns the upgrader configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &UpgraderConfig {
        &self.config
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the WebSocket URL of `path` on this server.
    ///
    /// Format: `ws://{addr}{path}`
    #[must_use]
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.local_addr, normalize_path(path))
    }

    /// Returns the number of registered endpoints.
    #[inline]
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns a view of a live session.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(&id).cloned()
    }

    /// Stops accepting connections.
    ///
    /// Live sessions run until their own shutdown.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!(local_addr = %self.local_addr, "WebSocket server shutting down");
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// ============================================================================
// Server - Internal
// ============================================================================

impl Server {
    fn endpoint(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.endpoints.read().get(path).cloned()
    }

    /// Accepts connections until shutdown.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                () = stopped(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer).await {
                                warn!(error = %e, %peer, "Connection rejected");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one connection and runs its session to completion.
    ///
    /// Returns once the handler has returned and the transport has been
    /// released.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<SessionStatus> {
        debug!(%peer, "TCP connection accepted");

        let mut route = None;
        let mut rejection = None;

        let callback = |request: &Request, response: Response| {
            match self.route(request, peer) {
                Ok(found) => {
                    route = Some(found);
                    Ok(response)
                }
                Err((status, e)) => {
                    let rejected = error_response(status, &e);
                    rejection = Some(e);
                    Err(rejected)
                }
            }
        };

        let upgraded = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            callback,
            Some(self.config.websocket_config()),
        )
        .await;

        let ws = match upgraded {
            Ok(ws) => ws,
            Err(e) => {
                return Err(rejection.unwrap_or_else(|| Error::handshake(peer.to_string(), e.to_string())));
            }
        };

        let Some(Route {
            handler,
            identity,
            query,
        }) = route
        else {
            return Err(Error::handshake(peer.to_string(), "upgrade completed without a route"));
        };

        let session = Session::open(identity, &self.config);
        let id = session.id();
        self.sessions.write().insert(id, session.handle());

        let status = session.run(ws, query, handler.as_ref()).await;

        self.sessions.write().remove(&id);
        Ok(status)
    }

    /// Resolves handler, identity and query for an upgrade request.
    fn route(&self, request: &Request, peer: SocketAddr) -> std::result::Result<Route, (StatusCode, Error)> {
        let path = request.uri().path();
        let handler = self
            .endpoint(path)
            .ok_or_else(|| (StatusCode::NOT_FOUND, Error::endpoint_not_found(path)))?;

        if let Some(origin) = request.headers().get(ORIGIN) {
            let origin = origin.to_str().unwrap_or_default();
            if !self.config.origin_policy.allows(origin) {
                return Err((StatusCode::FORBIDDEN, Error::origin_rejected(origin)));
            }
        }

        Ok(Route {
            handler,
            identity: identity_of(request.headers(), &self.config.identity_header, peer),
            query: QueryParams::parse(request.uri().query().unwrap_or_default()),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves once the shutdown flag is set or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// First entry of `header`, or the peer IP.
fn identity_of(headers: &HeaderMap, header: &str, peer: SocketAddr) -> String {
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}

fn error_response(status: StatusCode, e: &Error) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(e.to_string()));
    *response.status_mut() = status;
    response
}

// ============================================================================
// Tests
// ============================================================================
