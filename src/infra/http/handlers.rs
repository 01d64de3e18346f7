use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::domain::entities::PageMetaFields;
use crate::domain::types::{ContentCode, MetaKey, ViewAddress};

use super::error::ApiError;
use super::middleware::Caller;
use super::models::{SavePieceRequest, SavePieceResponse};
use super::state::CmsState;

const EDITABLE_HEADER: &str = "x-tessera-editable";

pub async fn health(State(state): State<CmsState>) -> Response {
    let Some(db) = state.db.as_ref() else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match db.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub async fn render_view(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path((namespace, view)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let address = ViewAddress::new(&namespace, &view)?;
    let compiled = state.pieces.render_view(caller.actor(), &address).await?;

    let mut response = Html(compiled.html).into_response();
    response.headers_mut().insert(
        EDITABLE_HEADER,
        HeaderValue::from_static(if compiled.editable { "true" } else { "false" }),
    );
    Ok(response)
}

pub async fn get_piece(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    ensure_editor(&state, &caller)?;
    let code = ContentCode::parse(&code)?;
    let piece = state
        .pieces
        .find_piece(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("Piece not found", Some(code.to_string())))?;
    Ok(Json(piece).into_response())
}

pub async fn save_piece(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path(code): Path<String>,
    Json(payload): Json<SavePieceRequest>,
) -> Result<Response, ApiError> {
    let code = ContentCode::parse(&code)?;
    let (piece, report) = state
        .pieces
        .save_piece(caller.actor(), &code, &payload.content)
        .await?;
    Ok(Json(SavePieceResponse::new(piece, report)).into_response())
}

pub async fn get_meta(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path((namespace, code, view)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    ensure_editor(&state, &caller)?;
    let key = MetaKey::parse(&namespace, &view, &code)?;
    let meta = state.pieces.find_meta(&key).await?.ok_or_else(|| {
        ApiError::not_found(
            "Page meta not found",
            Some(format!("{}:{}", key.address, key.code)),
        )
    })?;
    Ok(Json(meta).into_response())
}

pub async fn save_meta(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path((namespace, code, view)): Path<(String, String, String)>,
    Json(fields): Json<PageMetaFields>,
) -> Result<Response, ApiError> {
    let key = MetaKey::parse(&namespace, &view, &code)?;
    let meta = state.pieces.save_meta(caller.actor(), &key, fields).await?;
    Ok(Json(meta).into_response())
}

pub async fn compile_view(
    State(state): State<CmsState>,
    Extension(caller): Extension<Caller>,
    Path((namespace, view)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    ensure_editor(&state, &caller)?;
    let address = ViewAddress::new(&namespace, &view)?;
    state.pieces.compile_view(&address).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn ensure_editor(state: &CmsState, caller: &Caller) -> Result<(), ApiError> {
    if state.pieces.can_edit(caller.actor()) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}
