//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::service::CasinoService;
use std::future::Future;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

pub struct ApiServer {
    config: ApiConfig,
    service: Arc<CasinoService>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, service: Arc<CasinoService>) -> Self {
        Self { config, service }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.socket_addr()?;
        let app = self.create_app();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, origins = ?self.config.cors_origins, "wheelhouse API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    /// Router with the full middleware stack
    pub fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            service: self.service.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(self.config.cors_origins.clone()))
            .layer(TimeoutLayer::new(self.config.request_timeout()))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WheelhouseConfig;
    use crate::games::outcome::ScriptedOutcome;
    use crate::service::ServiceBuilder;
    use crate::storage::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app(slot: u8) -> axum::Router {
        let config = WheelhouseConfig::development();
        let service = ServiceBuilder::new(config.clone())
            .with_store(Arc::new(MemoryStore::new()))
            .with_outcome(Arc::new(ScriptedOutcome::always(slot)))
            .build()
            .await
            .unwrap();
        ApiServer::new(config.api, service).create_app()
    }

    async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-request-id", "test-req");
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        assert_eq!(response.headers()["x-request-id"], "test-req");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_full_round_over_http() {
        let app = app(17).await;

        let (status, round) = call(&app, "POST", "/round/alice/open", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(round["phase"], "betting");

        let bet = json!({ "bet_type": "number", "value": 17, "amount": 100 });
        let (status, placed) = call(&app, "POST", "/round/alice/bet", Some(bet)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(placed["new_balance"], 900);

        let (status, spin) = call(&app, "POST", "/round/alice/spin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(spin["winning_slot"], 17);
        assert_eq!(spin["new_balance"], 4500);

        let (_, balance) = call(&app, "GET", "/balance/alice", None).await;
        assert_eq!(balance["balance"], 4500);

        let (_, board) = call(&app, "GET", "/leaderboard?limit=5", None).await;
        assert_eq!(board["players"][0]["address"], "alice");
    }

    #[tokio::test]
    async fn test_game_errors_map_to_status_codes() {
        let app = app(0).await;

        let (status, body) = call(&app, "GET", "/round/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["request_id"], "test-req");
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        call(&app, "POST", "/round/alice/open", None).await;
        let (status, body) = call(&app, "POST", "/round/alice/spin", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NO_BETS");

        let too_much = json!({ "bet_type": "color", "value": "red", "amount": 5000 });
        let (status, body) = call(&app, "POST", "/round/alice/bet", Some(too_much)).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["details"]["available"], 1000);

        let bad = json!({ "bet_type": "number", "value": 40, "amount": 5 });
        let (status, body) = call(&app, "POST", "/round/alice/bet", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_validation_error() {
        let app = app(0).await;
        call(&app, "POST", "/round/alice/open", None).await;

        let (status, body) = call(&app, "POST", "/round/alice/bet", Some(json!({ "amount": 5 }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_health_and_house() {
        let app = app(0).await;

        let (status, health) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "Running");
        assert_eq!(health["service"]["store"], "memory");

        let (_, house) = call(&app, "GET", "/house", None).await;
        assert_eq!(house["balance"], 1_000_000);
        assert_eq!(house["recent_transactions"][0]["kind"], "maintenance");
    }

    #[tokio::test]
    async fn test_admin_reset() {
        let app = app(0).await;
        call(&app, "POST", "/round/alice/open", None).await;

        let (status, body) = call(&app, "POST", "/admin/reset/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset"], true);

        let (status, _) = call(&app, "GET", "/round/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
