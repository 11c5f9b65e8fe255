//! Local HTTP relay for pushed appliance events.
//!
//! The appliance's persistent push channel is terminated by a bridge process
//! that forwards each event as `POST /events` with `{"Name": .., "Data": ..}`.
//! The relay only enqueues; it answers 202 when the event was queued, 204
//! when nothing is registered under that name and 503 once the queue closed.
//! With a relay token configured, requests without `Authorization: Bearer
//! <token>` are rejected with 401 before the body is read.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::common::ProviderError;
use crate::config::RelayToken;
use crate::kernel::event_queue::{EventSender, PushedEvent};
use crate::kernel::BaseEventListener;

type Routes = Arc<HashMap<String, EventSender>>;

#[derive(Debug, Deserialize)]
pub struct RelayEnvelope {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

impl RelayEnvelope {
    /// Event body as the dispatcher expects it: JSON text.
    fn into_event(self) -> PushedEvent {
        let body = match self.data {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        PushedEvent::new(self.name, body)
    }
}

/// Routes relayed events into the registered queue senders.
pub fn router(routes: HashMap<String, EventSender>, token: Option<RelayToken>) -> Router {
    let token = token.map(Arc::new);
    Router::new()
        .route("/events", post(receive_event))
        .layer(middleware::from_fn(move |req, next| {
            relay_auth_middleware(token.clone(), req, next)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(routes))
}

/// Reject requests that do not present the configured relay token.
async fn relay_auth_middleware(
    token: Option<Arc<RelayToken>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = token {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        if !presented.is_some_and(|presented| token.matches(presented)) {
            warn!(uri = %request.uri(), "Rejected relay request without a valid token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    next.run(request).await
}

async fn receive_event(
    State(routes): State<Routes>,
    Json(envelope): Json<RelayEnvelope>,
) -> StatusCode {
    let Some(sink) = routes.get(&envelope.name) else {
        debug!(event = %envelope.name, "No handler registered, ignoring relayed event");
        return StatusCode::NO_CONTENT;
    };

    match sink.send(envelope.into_event()).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub struct RelayListener {
    addr: SocketAddr,
    token: Option<RelayToken>,
    routes: HashMap<String, EventSender>,
    shutdown: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl RelayListener {
    pub fn new(addr: SocketAddr, token: Option<RelayToken>) -> Self {
        if token.is_none() {
            warn!(addr = %addr, "Event relay accepts unauthenticated requests on loopback");
        }
        Self {
            addr,
            token,
            routes: HashMap::new(),
            shutdown: CancellationToken::new(),
            server: None,
        }
    }
}

#[async_trait]
impl BaseEventListener for RelayListener {
    fn register_handler(&mut self, event_name: &str, sink: EventSender) {
        self.routes.insert(event_name.to_string(), sink);
    }

    async fn start(&mut self) -> Result<(), ProviderError> {
        if self.server.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ProviderError::Unreachable(format!("bind {}: {}", self.addr, e)))?;
        let app = router(std::mem::take(&mut self.routes), self.token.clone());
        let shutdown = self.shutdown.clone();

        info!(addr = %self.addr, "Event relay listening");
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                warn!(error = %e, "Event relay stopped with error");
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProviderError> {
        self.shutdown.cancel();
        // Dropping the routes releases this listener's queue senders.
        self.routes.clear();
        if let Some(server) = self.server.take() {
            server
                .await
                .map_err(|e| ProviderError::Malformed(format!("event relay task failed: {}", e)))?;
            info!(addr = %self.addr, "Event relay stopped");
        }
        Ok(())
    }
}
