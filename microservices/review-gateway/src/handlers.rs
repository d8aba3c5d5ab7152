//! HTTP handlers for the review gateway
//!
//! Webhook handlers validate the provider signature before touching any
//! state; a failed check short-circuits with 403 and no side effects.

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use solara_core::PhoneNumber;

use crate::auth::SIGNATURE_HEADER;
use crate::cookies::CookieConversationStore;
use crate::customers::{DirectoryError, NewCustomer};
use crate::{AppState, StateBackend};

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/sms", post(handle_sms))
        .route("/call-event", post(handle_call_event))
        .route("/campaign-start", post(start_campaign))
        .route("/call-total", get(call_total))
        .route("/register", get(register_page).post(register_customer))
        .route("/metrics", get(metrics_export))
        .with_state(app)
}

async fn ping() -> &'static str {
    "pong"
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy" })))
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
}

/// Reconstruct the exact URL the provider signed.
fn signed_url(base_url: &str, uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(pq) => format!("{}{}", base_url, pq),
        None => base_url.to_string(),
    }
}

fn is_authentic(
    app: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> bool {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let url = signed_url(&app.config.base_url, uri);
    app.validator.is_valid(&url, params, signature)
}

/// Inbound SMS webhook
async fn handle_sms(
    State(app): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    if !is_authentic(&app, &uri, &headers, &params) {
        warn!("Rejected SMS webhook with missing or invalid signature");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(from) = params.get("From") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let from = PhoneNumber::new(from.clone());
    // A missing body is treated as empty input and falls into the
    // fallback branch downstream.
    let body = params.get("Body").cloned().unwrap_or_default();

    let caller_name = app.directory.find_by_phone(&from).map(|c| c.first_name);

    match &app.backend {
        StateBackend::Memory(store) => {
            match app
                .flow
                .handle_inbound_sms(store.as_ref(), &from, &body, caller_name.as_deref())
                .await
            {
                Ok(()) => StatusCode::OK.into_response(),
                Err(e) => {
                    error!(from = %from, error = %e, "Failed to process inbound SMS");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        StateBackend::Cookie(signer) => {
            let store = CookieConversationStore::from_cookie_header(
                signer.clone(),
                headers.get(header::COOKIE).and_then(|v| v.to_str().ok()),
            );
            match app
                .flow
                .handle_inbound_sms(&store, &from, &body, caller_name.as_deref())
                .await
            {
                Ok(()) => {
                    let mut response = StatusCode::OK.into_response();
                    for cookie in store.take_set_cookies() {
                        if let Ok(value) = header::HeaderValue::from_str(&cookie) {
                            response.headers_mut().append(header::SET_COOKIE, value);
                        }
                    }
                    response
                }
                Err(e) => {
                    error!(from = %from, error = %e, "Failed to process inbound SMS");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
    }
}

/// Call-status webhook: thank the reviewer once their call completed
async fn handle_call_event(
    State(app): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    if !is_authentic(&app, &uri, &headers, &params) {
        warn!("Rejected call-event webhook with missing or invalid signature");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(to) = params.get("To") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let to = PhoneNumber::new(to.clone());

    match app.flow.handle_call_completed(&to).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(to = %to, error = %e, "Failed to send thank-you");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Kick off the review campaign over the full customer directory
async fn start_campaign(State(app): State<Arc<AppState>>) -> Response {
    let customers = app.directory.list();
    let report = app.dispatcher.start_campaign(customers).await;

    Json(serde_json::json!({
        "status": "success",
        "message": "Success",
        "invites": report.invited,
        "failures": report.failures,
    }))
    .into_response()
}

/// Total calls placed, from the provider's call log
async fn call_total(State(app): State<Arc<AppState>>) -> Response {
    match app.transport.list_calls().await {
        Ok(logs) => format!("Total Calls: {}", logs.len()).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to retrieve call logs");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

const REGISTER_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Review Rewards Registration</title></head>
<body>
  <h1>Solara Resorts and Spas</h1>
  <p>Register for the review rewards program.</p>
  <form id="register-form">
    <label>First name <input name="firstName" required></label><br>
    <label>Last name <input name="lastName" required></label><br>
    <label>Phone number <input name="phoneNumber" required></label><br>
    <label>Email <input name="email" type="email" required></label><br>
    <button type="submit">Register</button>
  </form>
  <script>
    document.getElementById('register-form').addEventListener('submit', async (e) => {
      e.preventDefault();
      const data = Object.fromEntries(new FormData(e.target));
      const res = await fetch('/register', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(data),
      });
      alert(res.ok ? 'Registered!' : 'Registration failed.');
    });
  </script>
</body>
</html>
"#;

async fn register_page() -> Html<&'static str> {
    Html(REGISTER_PAGE)
}

async fn register_customer(
    State(app): State<Arc<AppState>>,
    Json(new_customer): Json<NewCustomer>,
) -> Response {
    match app.directory.create(new_customer) {
        Ok(customer) => Json(serde_json::json!({
            "status": "success",
            "message": "Success",
            "customer": customer,
        }))
        .into_response(),
        Err(DirectoryError::Validation(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "status": "invalidRequest",
                "message": reason,
            })),
        )
            .into_response(),
        Err(DirectoryError::AlreadyExists) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "alreadyExists",
                "message": "Customer already exists",
            })),
        )
            .into_response(),
    }
}

/// Plain-text metric exposition
async fn metrics_export(State(app): State<Arc<AppState>>) -> String {
    if let StateBackend::Memory(store) = &app.backend {
        app.metrics.active_conversations.set(store.len() as u64);
    }
    app.metrics.expose()
}
