use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Router,
};
use tower_http::trace::TraceLayer;

pub const LIVENESS_BODY: &str = "This server is running and listening to Firestore changes.\n";

/// Answers every request so the hosting platform's health check stays green.
pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        LIVENESS_BODY,
    )
}

pub fn create_router() -> Router {
    // Any path, any method
    Router::new()
        .fallback(liveness)
        .layer(TraceLayer::new_for_http())
}
