//! Webhook edges for both transports. The contract with the providers is
//! mutate-then-acknowledge: a handler runs the whole engine turn (which
//! persists durably), then returns 200, then the sends and rendering run
//! detached. An unacknowledged webhook would be redelivered and replay
//! state mutation, so nothing after the engine call is allowed to fail the
//! response.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tracing::{info, warn};

use karani_core::config::AppConfig;
use karani_core::errors::EdgeError;
use karani_transport::twilio;
use karani_transport::whatsapp;

use crate::dispatch::Dispatcher;
use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/twilio", post(twilio_webhook))
        .route("/webhooks/whatsapp", get(whatsapp_verify).post(whatsapp_webhook))
        .with_state(state)
}

async fn twilio_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    if !state.config.twilio.enabled {
        return StatusCode::NOT_FOUND;
    }

    let Some(signature) = headers.get("x-twilio-signature").and_then(|value| value.to_str().ok())
    else {
        warn!("twilio webhook without signature header");
        return StatusCode::FORBIDDEN;
    };

    let url = format!(
        "{}/webhooks/twilio",
        state.config.server.public_base_url.trim_end_matches('/')
    );
    if !twilio::verify_signature(&state.config.twilio.auth_token, &url, &params, signature) {
        warn!("twilio webhook signature rejected");
        return StatusCode::FORBIDDEN;
    }

    let Some(event) = twilio::parse_form(&params) else {
        return StatusCode::OK;
    };

    match state.engine.handle(&event).await {
        Ok(reply) => {
            let engine = Arc::clone(&state.engine);
            let dispatcher = Arc::clone(&state.dispatcher);
            tokio::spawn(async move {
                dispatcher.deliver(engine.deps(), reply).await;
            });
            StatusCode::OK
        }
        Err(edge) => edge_status(&edge),
    }
}

async fn whatsapp_verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !state.config.whatsapp.enabled {
        return (StatusCode::NOT_FOUND, String::new());
    }

    match whatsapp::handshake_response(
        &state.config.whatsapp.verify_token,
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    ) {
        Some(challenge) => {
            info!("whatsapp webhook verified");
            (StatusCode::OK, challenge)
        }
        None => (StatusCode::FORBIDDEN, String::new()),
    }
}

async fn whatsapp_webhook(
    State(state): State<AppState>,
    Json(payload): Json<whatsapp::WebhookPayload>,
) -> impl IntoResponse {
    if !state.config.whatsapp.enabled {
        return StatusCode::NOT_FOUND;
    }

    for event in whatsapp::parse_webhook(&payload) {
        match state.engine.handle(&event).await {
            Ok(reply) => {
                let engine = Arc::clone(&state.engine);
                let dispatcher = Arc::clone(&state.dispatcher);
                tokio::spawn(async move {
                    dispatcher.deliver(engine.deps(), reply).await;
                });
            }
            Err(edge) => {
                // Rejected identities are dropped, not errored: the
                // provider must still get its 200 for the batch.
                warn!(error = %edge, "inbound event rejected at the edge");
            }
        }
    }

    StatusCode::OK
}

fn edge_status(edge: &EdgeError) -> StatusCode {
    match edge {
        EdgeError::BadSignature | EdgeError::HandshakeRejected => StatusCode::FORBIDDEN,
        EdgeError::Identity(_) => StatusCode::BAD_REQUEST,
    }
}
