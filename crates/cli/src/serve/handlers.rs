//! HTTP route handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use quayside_core::{ComponentFactory, ConformanceRequest};
use quayside_sandbox::SandboxConfiguration;

use super::state::AppState;
use super::{json_error, sandbox_error};

/// Request headers that belong to this server, not to the simulated party.
const LOCAL_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "authorization",
    "x-api-key",
];

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "standard": state.sandbox.factory().report_title(),
    });
    (StatusCode::OK, Json(response))
}

/// POST /sandboxes
pub(crate) async fn handle_create_sandbox(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let config: SandboxConfiguration = match serde_json::from_value(body) {
        Ok(c) => c,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("invalid sandbox configuration: {}", e),
            )
            .into_response()
        }
    };
    match state.sandbox.create(config).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// GET /sandboxes/{id}
pub(crate) async fn handle_get_sandbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sandbox.configuration(&id).await {
        Ok(config) => (StatusCode::OK, Json(config)).into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// POST /sandboxes/{id}/reset
pub(crate) async fn handle_reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sandbox.reset(&id).await {
        Ok(session_id) => {
            (StatusCode::OK, Json(json!({ "sessionId": session_id }))).into_response()
        }
        Err(e) => sandbox_error(e),
    }
}

/// POST /sandboxes/{id}/stop
pub(crate) async fn handle_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sandbox.stop(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// GET /sandboxes/{id}/status
pub(crate) async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sandbox.status(&id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => sandbox_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReportQuery {
    #[serde(default)]
    detailed: bool,
    role: Option<String>,
}

/// GET /sandboxes/{id}/report
pub(crate) async fn handle_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let roles: Vec<String> = query.role.into_iter().collect();
    let reports = match state.sandbox.report(&id, &roles).await {
        Ok(r) => r,
        Err(e) => return sandbox_error(e),
    };
    let body = if query.detailed {
        json!({ "reports": reports })
    } else {
        let digests: Vec<Value> = reports
            .iter()
            .map(|r| json!({ "role": r.role, "digest": r.report.digest() }))
            .collect();
        json!({ "reports": digests })
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /sandboxes/{id}/parties/{party}/prompt
pub(crate) async fn handle_party_prompt(
    State(state): State<Arc<AppState>>,
    Path((id, party)): Path<(String, String)>,
) -> Response {
    match state.sandbox.party_prompt(&id, &party).await {
        Ok(prompts) => (StatusCode::OK, Json(prompts)).into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// POST /sandboxes/{id}/parties/{party}/input
pub(crate) async fn handle_party_input(
    State(state): State<Arc<AppState>>,
    Path((id, party)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    match state.sandbox.configuration(&id).await {
        Ok(config) if config.party(&party).is_none() => {
            return json_error(
                StatusCode::NOT_FOUND,
                &format!("sandbox '{}' has no party named '{}'", id, party),
            )
            .into_response()
        }
        Ok(_) => {}
        Err(e) => return sandbox_error(e),
    }
    match state.sandbox.party_input(&id, &body).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// GET /sandboxes/{id}/parties/{party}/log
pub(crate) async fn handle_party_log(
    State(state): State<Arc<AppState>>,
    Path((id, party)): Path<(String, String)>,
) -> Response {
    match state.sandbox.party_operator_log(&id, &party).await {
        Ok(log) => (StatusCode::OK, Json(log)).into_response(),
        Err(e) => sandbox_error(e),
    }
}

/// ANY /sandboxes/{id}/parties/{party}/api/{*path}
///
/// The request is addressed to the simulated party `party` and comes from
/// the system under test, i.e. the configured party running outside the
/// sandbox.
pub(crate) async fn handle_party_api(
    State(state): State<Arc<AppState>>,
    Path((id, party, path)): Path<(String, String, String)>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let config = match state.sandbox.configuration(&id).await {
        Ok(c) => c,
        Err(e) => return sandbox_error(e),
    };
    let Some(target) = config.party(&party) else {
        return json_error(
            StatusCode::NOT_FOUND,
            &format!("sandbox '{}' has no party named '{}'", id, party),
        )
        .into_response();
    };
    let source = config
        .parties
        .iter()
        .find(|p| p.name != party && !p.in_sandbox)
        .or_else(|| config.parties.iter().find(|p| p.name != party));

    let mut request = ConformanceRequest::new(method.as_str(), &format!("/{}", path))
        .to_party(&target.name, &target.role)
        .with_body(parse_body(&body));
    if let Some(source) = source {
        request = request.from_party(&source.name, &source.role);
    }
    for (name, value) in query {
        request.query_params.entry(name).or_default().push(value);
    }
    for (name, value) in headers.iter() {
        if LOCAL_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let response = match state.sandbox.handle_party_request(&id, &party, request).await {
        Ok(r) => r,
        Err(e) => return sandbox_error(e),
    };

    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response_headers = HeaderMap::new();
    for (name, values) in &response.message.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                response_headers.append(name.clone(), value);
            }
        }
    }
    if response.message.body.is_null() {
        (status, response_headers).into_response()
    } else {
        (status, response_headers, Json(response.message.body)).into_response()
    }
}

fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bodies_are_null_and_text_is_kept() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"  \n"), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body(b"eyJhbGciOi.x.y"), json!("eyJhbGciOi.x.y"));
    }
}
