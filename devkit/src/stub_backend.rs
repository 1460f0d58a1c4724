/*!
Backend HTTP stub pour développement sans base de données

Sert `/api/devices` et `/api/usage` sur un port éphémère à partir de
collections JSON modifiables à chaud. Chaque route peut être mise en panne
(statut HTTP, corps illisible, latence) pour exercer les chemins d'erreur
du viewer.
*/

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::fixtures::FleetFixture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Devices,
    Usage,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Devices => "/api/devices",
            Route::Usage => "/api/usage",
        }
    }
}

/// Panne injectée sur une route
#[derive(Debug, Clone)]
pub enum Fault {
    /// Répond avec ce statut HTTP
    Status(u16),
    /// 200 avec un corps JSON tronqué
    Malformed,
    /// 200 avec un objet au lieu d'une liste
    WrongShape,
    /// Attend avant de répondre normalement
    Delay(Duration),
}

#[derive(Debug, Default)]
struct Endpoint {
    body: Value,
    fault: Option<Fault>,
    hits: usize,
}

#[derive(Debug, Default)]
struct BackendState {
    devices: Endpoint,
    usage: Endpoint,
}

impl BackendState {
    fn endpoint(&mut self, route: Route) -> &mut Endpoint {
        match route {
            Route::Devices => &mut self.devices,
            Route::Usage => &mut self.usage,
        }
    }
}

type SharedState = Arc<Mutex<BackendState>>;

/// Backend stub démarré dans une tâche tokio; arrêté au drop
pub struct StubBackend {
    state: SharedState,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl StubBackend {
    /// Démarre le serveur sur 127.0.0.1 avec deux collections vides
    pub async fn spawn() -> Result<Self> {
        let state: SharedState = Arc::new(Mutex::new(BackendState {
            devices: Endpoint { body: Value::Array(Vec::new()), ..Default::default() },
            usage: Endpoint { body: Value::Array(Vec::new()), ..Default::default() },
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_router(state.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [STUB] Server error: {}", e);
            }
        });

        log::info!("🚀 [STUB] Backend listening on http://{}", addr);
        Ok(Self { state, addr, server })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Remplace les deux collections d'un coup
    pub fn load(&self, fleet: &FleetFixture) {
        let mut state = self.state.lock();
        state.devices.body = fleet.inventory();
        state.usage.body = fleet.usage();
        log::debug!("📦 [STUB] Fleet loaded");
    }

    pub fn set_body(&self, route: Route, body: Value) {
        self.state.lock().endpoint(route).body = body;
    }

    pub fn inject(&self, route: Route, fault: Fault) {
        log::info!("💥 [STUB] Fault on {}: {:?}", route.path(), fault);
        self.state.lock().endpoint(route).fault = Some(fault);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.devices.fault = None;
        state.usage.fault = None;
    }

    /// Nombre de requêtes reçues sur une route
    pub fn hits(&self, route: Route) -> usize {
        self.state.lock().endpoint(route).hits
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/devices", get(get_devices))
        .route("/api/usage", get(get_usage))
        .with_state(state)
}

async fn get_devices(State(state): State<SharedState>) -> Response {
    respond(&state, Route::Devices).await
}

async fn get_usage(State(state): State<SharedState>) -> Response {
    respond(&state, Route::Usage).await
}

async fn respond(state: &SharedState, route: Route) -> Response {
    let (body, fault) = {
        let mut state = state.lock();
        let endpoint = state.endpoint(route);
        endpoint.hits += 1;
        (endpoint.body.clone(), endpoint.fault.clone())
    };

    match fault {
        None => Json(body).into_response(),
        Some(Fault::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "stub failure").into_response()
        }
        Some(Fault::Malformed) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            "[{\"Name\": \"trunc",
        )
            .into_response(),
        Some(Fault::WrongShape) => Json(serde_json::json!({ "error": "not a list" })).into_response(),
        Some(Fault::Delay(delay)) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
    }
}
