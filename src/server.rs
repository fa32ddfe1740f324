use crate::{
    config::ServerConfig,
    error::ApiError,
    intake::UploadForm,
    service::{Answer, VqaService},
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

/// Builds the application router around a shared pipeline.
pub fn router(service: Arc<VqaService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to DigitalEye!" }))
        .route("/health", get(get_health))
        .route("/send_check", post(post_send_check))
        .route("/send_per_check", post(post_send_per_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Binds the configured address and serves until Ctrl+C.
pub async fn serve(config: &ServerConfig, service: Arc<VqaService>) -> std::io::Result<()> {
    let addr = config.addr();
    let app = router(service, config.max_upload_bytes);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

async fn get_health(State(service): State<Arc<VqaService>>) -> impl IntoResponse {
    Json(json!({
        "status": service.engine_state().as_str(),
        "answered": service.answered(),
    }))
}

async fn post_send_check(
    State(service): State<Arc<VqaService>>,
    multipart: Multipart,
) -> Result<Json<Answer>, ApiError> {
    let mut form = UploadForm::from_multipart(multipart).await?;
    let image = form.require_image()?;
    let question = service.questions().resolve(form.text.take());

    Ok(Json(service.answer(image, question).await?))
}

async fn post_send_per_check(
    State(service): State<Arc<VqaService>>,
    multipart: Multipart,
) -> Result<Json<Answer>, ApiError> {
    let mut form = UploadForm::from_multipart(multipart).await?;
    let image = form.require_image()?;
    let question = service.questions().caption_prompt.clone();

    Ok(Json(service.answer(image, question).await?))
}
