use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::IntoResponse;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{Instrument, error, field, info_span, warn};
use uuid::Uuid;

use crate::application::access::Actor;
use crate::application::error::ErrorReport;

use super::error::ApiError;
use super::state::CmsState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// The actor behind a request; `None` for anonymous callers.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Actor>);

impl Caller {
    pub fn actor(&self) -> Option<&Actor> {
        self.0.as_ref()
    }
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the bearer token into a [`Caller`]. A request without an
/// `Authorization` header is anonymous; a header that is not a bearer token,
/// or a token that matches no actor, is rejected.
pub async fn resolve_actor(
    State(state): State<CmsState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let caller = match extract_token(request.headers().get(header::AUTHORIZATION)) {
        Credentials::Absent => Caller(None),
        Credentials::Bearer(token) => match state.actors.authenticate(&token) {
            Some(actor) => Caller(Some(actor)),
            None => return ApiError::unauthorized().into_response(),
        },
        Credentials::Malformed => return ApiError::unauthorized().into_response(),
    };

    request.extensions_mut().insert(caller.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(caller);
    response
}

#[derive(Debug, PartialEq, Eq)]
enum Credentials {
    Absent,
    Bearer(String),
    Malformed,
}

fn extract_token(header: Option<&HeaderValue>) -> Credentials {
    let Some(header) = header else {
        return Credentials::Absent;
    };
    let Ok(raw) = header.to_str() else {
        return Credentials::Malformed;
    };
    let Some((scheme, token)) = raw.trim().split_once(' ') else {
        return Credentials::Malformed;
    };
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Credentials::Malformed;
    }
    Credentials::Bearer(token.to_string())
}

/// Log failed responses inside a per-request span carrying the request id and
/// the resolved actor.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let span = info_span!(
        target: "tessera::http",
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = field::Empty,
        actor = field::Empty,
    );
    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        span.record("request_id", ctx.request_id.as_str());
    }

    let mut response = next.run(request).instrument(span.clone()).await;

    let actor = response
        .extensions()
        .get::<Caller>()
        .and_then(Caller::actor)
        .map_or_else(|| "anonymous".to_string(), Actor::label);
    span.record("actor", actor.as_str());

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let elapsed_ms = started.elapsed().as_millis();

    span.in_scope(|| {
        if status.is_server_error() {
            error!(
                target = "tessera::http::response",
                status = status.as_u16(),
                elapsed_ms,
                source,
                chain = ?chain,
                "request failed"
            );
        } else {
            warn!(
                target = "tessera::http::response",
                status = status.as_u16(),
                elapsed_ms,
                source,
                detail = chain.first().map(String::as_str).unwrap_or("-"),
                "request rejected"
            );
        }
    });

    response
}
