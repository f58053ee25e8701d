//! HTTP/WebSocket shell for the tfpilot deployment service
//!
//! Two request/response operations (parse, deploy/destroy) and one streaming
//! channel. Parse failures come back synchronously with a status code;
//! anything that happens after a deployment is accepted is only observable
//! on the WebSocket stream, keyed by deployment identifier.

pub mod error;
pub mod hub;
pub mod ws;

pub use error::{Result, ServerError};
pub use hub::EventHub;

use axum::extract::{Json as AxumJson, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tfpilot_core::deploy::DeployAction;
use tfpilot_core::{DeploymentRequest, Pilot};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the tfpilot server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            enable_cors: true,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pilot: Arc<Pilot>,
    pub hub: Arc<EventHub>,
    pub config: ServerConfig,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    repo: String,
}

#[derive(Debug, Deserialize)]
struct DeployBody {
    repo: String,
    #[serde(default)]
    variables: BTreeMap<String, Value>,
    deployment_id: Option<String>,
}

/// Handler for the /api/parse POST endpoint.
async fn parse_handler(
    State(state): State<AppState>,
    AxumJson(body): AxumJson<ParseBody>,
) -> Result<Json<Value>> {
    log::info!("Received parse request for {}", body.repo);
    let outcome = state.pilot.parse_repository(&body.repo).await?;
    Ok(Json(json!({
        "status": "success",
        "result": outcome,
        "timestamp": chrono::Utc::now()
    })))
}

/// Handler for the /api/deploy POST endpoint.
async fn deploy_handler(
    State(state): State<AppState>,
    AxumJson(body): AxumJson<DeployBody>,
) -> Result<(StatusCode, Json<Value>)> {
    start_deployment(state, body, DeployAction::Apply).await
}

/// Handler for the /api/destroy POST endpoint.
async fn destroy_handler(
    State(state): State<AppState>,
    AxumJson(body): AxumJson<DeployBody>,
) -> Result<(StatusCode, Json<Value>)> {
    start_deployment(state, body, DeployAction::Destroy).await
}

/// Accept a deployment and hand it to a background task.
///
/// The only synchronous rejections are a missing identifier and nothing
/// else; every later failure arrives on the stream.
async fn start_deployment(
    state: AppState,
    body: DeployBody,
    action: DeployAction,
) -> Result<(StatusCode, Json<Value>)> {
    let deployment_id = body
        .deployment_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::missing_field("deployment_id"))?;

    log::info!(
        "Accepted {} request {} for {}",
        action,
        deployment_id,
        body.repo
    );
    state.hub.open(&deployment_id).await;

    let request = DeploymentRequest {
        repo: body.repo,
        variables: body.variables,
        deployment_id: deployment_id.clone(),
        action,
    };

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let pilot = state.pilot.clone();
    tokio::spawn(async move {
        pilot.execute_deployment(request, tx).await;
    });
    let hub = state.hub.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            hub.publish(event).await;
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "deployment_id": deployment_id,
            "timestamp": chrono::Utc::now()
        })),
    ))
}

/// Handler for the /api/deployments GET endpoint.
async fn deployments_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let records = state.pilot.history()?;
    let count = records.len();
    Ok(Json(json!({
        "status": "success",
        "deployments": records,
        "count": count,
        "timestamp": chrono::Utc::now()
    })))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// The main tfpilot server.
pub struct PilotServer {
    pilot: Arc<Pilot>,
    config: ServerConfig,
}

impl PilotServer {
    /// Create a new server with the given pilot and default configuration.
    pub fn new(pilot: Pilot) -> Self {
        Self {
            pilot: Arc::new(pilot),
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(pilot: Pilot, config: ServerConfig) -> Self {
        Self {
            pilot: Arc::new(pilot),
            config,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pilot: self.pilot.clone(),
            hub: Arc::new(EventHub::new()),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/api/parse", post(parse_handler))
            .route("/api/deploy", post(deploy_handler))
            .route("/api/destroy", post(destroy_handler))
            .route("/api/deployments", get(deployments_handler))
            .route("/ws", get(ws::ws_handler))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();
                    log::info!("Response {} completed in {:?}", request_id, duration);

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("tfpilot server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Parse endpoint: http://{}/api/parse", self.config.bind_addr);
        log::info!(
            "Deploy endpoint: http://{}/api/deploy",
            self.config.bind_addr
        );
        log::info!("Event stream: ws://{}/ws", self.config.bind_addr);

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;
        Ok(())
    }

    /// Start the server with graceful shutdown support.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "tfpilot server starting on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("tfpilot server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
