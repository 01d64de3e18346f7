//! HTTP surface: compiled views for readers and the content editing API.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::CmsState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub fn build_router(state: CmsState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/views/{namespace}/{*view}", get(handlers::render_view))
        .route(
            "/cms/pieces/{code}",
            get(handlers::get_piece).put(handlers::save_piece),
        )
        .route(
            "/cms/meta/{namespace}/{code}/{*view}",
            get(handlers::get_meta).put(handlers::save_meta),
        )
        .route(
            "/cms/compile/{namespace}/{*view}",
            post(handlers::compile_view),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_actor,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
