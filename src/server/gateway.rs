//! Gateway server: configuration, shared state and the HTTP router

use crate::accounts::AccountService;
use crate::auth::{LoginFlow, SessionManager, SharedSecretStore, DEFAULT_SESSION_DURATION};
use crate::server::connections::SessionRegistry;
use crate::server::cookies::CookieAttributes;
use crate::server::{web, websocket};
use crate::storage::AccountRepository;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct CallgateServerConfig {
    pub bind_addr: SocketAddr,
    /// Seconds of inactivity before a session cookie expires
    pub session_duration: u64,
    /// `Domain` attribute for cookies we set; host-only when `None`
    pub cookie_domain: Option<String>,
    pub secrets: SharedSecretStore,
}

impl Default for CallgateServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            session_duration: DEFAULT_SESSION_DURATION,
            cookie_domain: None,
            secrets: SharedSecretStore::default(),
        }
    }
}

/// State shared by every handler
#[derive(Clone)]
pub struct GatewayState {
    pub login: LoginFlow,
    pub secrets: Arc<SharedSecretStore>,
    pub sessions: SessionRegistry,
    pub cookies: CookieAttributes,
}

impl GatewayState {
    pub fn new(config: &CallgateServerConfig, repo: Arc<dyn AccountRepository>) -> Self {
        let secrets = Arc::new(config.secrets.clone());
        let login = LoginFlow::new(
            AccountService::new(repo),
            SessionManager::new(secrets.clone(), config.session_duration),
        );

        Self {
            login,
            secrets,
            sessions: SessionRegistry::new(),
            cookies: CookieAttributes {
                path: "/".to_string(),
                domain: config.cookie_domain.clone(),
            },
        }
    }
}

/// Build the HTTP router
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/login", post(web::login))
        .route("/logout", post(web::logout))
        .route("/session", get(web::session))
        .route("/signup", post(web::signup))
        .route("/activate", get(web::activate))
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// The gateway
pub struct CallgateServer {
    config: CallgateServerConfig,
    state: GatewayState,
}

impl CallgateServer {
    pub fn new(config: CallgateServerConfig, repo: Arc<dyn AccountRepository>) -> Self {
        let state = GatewayState::new(&config, repo);
        Self { config, state }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Run the server until the listener fails
    pub async fn run(&self) -> Result<()> {
        if !self.config.secrets.has_session_salt() {
            warn!("No session salt configured; logins will fail with an internal error");
        }
        if !self.config.secrets.has_ticket_secret() {
            warn!("No ticket secret configured; WebSocket upgrades will be refused");
        }

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            session_duration = self.config.session_duration,
            "Callgate gateway listening"
        );

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
