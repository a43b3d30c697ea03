//! Route handlers.
//!
//! Two families with identical semantics and different error shapes:
//! `/` + `/check` answer JSON errors, `/pair/code` + `/pair/get-code`
//! answer plain-text status messages. Successful code responses are
//! plain text in both.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use serde_json::json;

use crate::cache::Lookup;
use crate::error::Error;
use crate::pairing::{PairingOrchestrator, PairingOutcome};
use crate::phone::PhoneNumber;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PairingOrchestrator>,
}

/// Build the full route tree.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(initiate))
        .route("/check", get(check))
        .route("/pair/code", get(initiate_plain))
        .route("/pair/get-code", get(check_json_alias))
        .route("/pair/web", get(web_page))
        .with_state(state)
}

/// Accepts either `?num=` or `?number=`.
#[derive(Debug, Deserialize)]
pub struct NumberQuery {
    num: Option<String>,
    number: Option<String>,
}

impl NumberQuery {
    fn raw(&self) -> Option<&str> {
        self.num.as_deref().or(self.number.as_deref())
    }
}

fn json_error(status: StatusCode, error: &str, message: String) -> Response {
    let body = axum::Json(json!({ "error": error, "message": message }));
    (status, body).into_response()
}

fn missing_number_json() -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "Phone number required",
        "Use: /?num=923027598014 or /?number=923027598014".to_string(),
    )
}

/// `GET /?num=<digits>` — start a pairing attempt.
///
/// Plain-text code (or `Already registered`) on success, JSON error
/// otherwise.
async fn initiate(State(state): State<AppState>, Query(query): Query<NumberQuery>) -> Response {
    let Some(raw) = query.raw() else {
        return missing_number_json();
    };
    tracing::info!(input = raw, "pairing requested");

    match state.orchestrator.begin(raw).await {
        Ok(PairingOutcome::Code(code)) => code.into_response(),
        Ok(PairingOutcome::AlreadyRegistered) => "Already registered".into_response(),
        Err(Error::Phone(e)) => json_error(
            StatusCode::BAD_REQUEST,
            "Invalid phone number",
            format!("{e}. Enter a valid international number, e.g. 923027598014"),
        ),
        Err(e) => {
            tracing::error!(input = raw, error = %e, "pairing attempt failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Pairing failed",
                e.to_string(),
            )
        }
    }
}

/// `GET /check?num=<digits>` — poll for a cached code.
///
/// 404 when no code exists, 410 when the code expired (evicting it).
async fn check(State(state): State<AppState>, Query(query): Query<NumberQuery>) -> Response {
    let Some(raw) = query.raw() else {
        return missing_number_json();
    };
    let number = match PhoneNumber::normalize(raw) {
        Ok(number) => number,
        Err(e) => {
            return json_error(StatusCode::BAD_REQUEST, "Invalid phone number", e.to_string());
        }
    };

    let cache = state.orchestrator.cache();
    match cache.lookup(&number).await {
        Lookup::Hit(entry) => axum::Json(json!({
            "number": number.as_str(),
            "pairing_code": entry.code,
            "expires_in": cache.expires_in(&entry),
        }))
        .into_response(),
        Lookup::Expired => json_error(
            StatusCode::GONE,
            "Pairing code expired",
            format!("The code for {number} is older than 5 minutes; request a new one"),
        ),
        Lookup::Miss => json_error(
            StatusCode::NOT_FOUND,
            "No pairing code found",
            format!("No pairing code found for {number}"),
        ),
    }
}

/// `GET /pair/code?number=<digits>` — same flow as `/`, plain-text errors.
async fn initiate_plain(
    State(state): State<AppState>,
    Query(query): Query<NumberQuery>,
) -> Response {
    let Some(raw) = query.raw() else {
        return (StatusCode::BAD_REQUEST, "Phone number required").into_response();
    };

    match state.orchestrator.begin(raw).await {
        Ok(PairingOutcome::Code(code)) => code.into_response(),
        Ok(PairingOutcome::AlreadyRegistered) => "Already registered".into_response(),
        Err(Error::Phone(_)) => (StatusCode::BAD_REQUEST, "Invalid phone number").into_response(),
        Err(e) => {
            tracing::error!(input = raw, error = %e, "pairing attempt failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get pairing code",
            )
                .into_response()
        }
    }
}

/// `GET /pair/get-code?number=<digits>` — same contract as `/check`.
async fn check_json_alias(
    state: State<AppState>,
    query: Query<NumberQuery>,
) -> Response {
    check(state, query).await
}

/// `GET /pair/web` — static instructional page.
async fn web_page() -> Html<&'static str> {
    Html(PAIR_PAGE)
}

const PAIR_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>WhatsApp Pairing</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 28rem; margin: 4rem auto; padding: 0 1rem; }
    input, button { font-size: 1rem; padding: .5rem; }
    code { background: #eee; padding: .1rem .3rem; }
  </style>
</head>
<body>
  <h1>Link your WhatsApp</h1>
  <ol>
    <li>Enter your phone number in international format, digits only
        (example: <code>923027598014</code>).</li>
    <li>Submit and note the pairing code.</li>
    <li>On your phone: WhatsApp &rarr; Linked devices &rarr; Link a device
        &rarr; Link with phone number instead, then enter the code.</li>
    <li>Your session file will be sent to your own chat once linked.
        The code expires after 5 minutes.</li>
  </ol>
  <form action="/pair/code" method="get">
    <input type="text" name="number" placeholder="923027598014" required>
    <button type="submit">Get pairing code</button>
  </form>
</body>
</html>
"#;
