use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    auth::{self, gate::session_gate},
    content,
    error::AppError,
    pages, public, uploads,
    state::AppState,
};

async fn api_not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

pub fn build_app(state: AppState) -> Router {
    let uploads_dir = state.config.uploads.dir.clone();
    let uploads_prefix = state.config.uploads.url_prefix.clone();
    let max_upload = state.config.uploads.max_bytes;

    Router::new()
        .merge(pages::router())
        .route("/health", get(|| async { "ok" }))
        .nest_service(&uploads_prefix, ServeDir::new(uploads_dir))
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(uploads::router(max_upload))
                .merge(content::router())
                .merge(public::router())
                .fallback(api_not_found),
        )
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
