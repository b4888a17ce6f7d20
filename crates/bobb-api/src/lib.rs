pub mod error;
pub mod handlers;
pub mod headers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use error::ApiError;
pub use handlers::ApiState;
pub use headers::{RequestHeaders, RequiredHeaders};

/// The full application: routes, header parsing, response header injection.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/create-header", post(handlers::handle_create_header))
        .route("/v1/status", get(handlers::handle_status))
        .layer(middleware::from_fn(headers::parse_request_headers))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            headers::inject_response_headers,
        ))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
