//! HTTP boundary: `POST /ocr` and `GET /health`.
//!
//! The handler only reads the multipart body into an [`UploadedDocument`];
//! everything after that is [`run_ocr`]. Errors become JSON bodies through
//! the `IntoResponse` impl on [`OcrError`].

use crate::context::OcrContext;
use crate::error::OcrError;
use crate::ocr::run_ocr;
use crate::pipeline::decode::OcrOutput;
use crate::pipeline::intake::UploadedDocument;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Multipart framing overhead allowed on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the application router around a shared context.
pub fn router(ctx: Arc<OcrContext>) -> Router {
    let body_limit = ctx.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ocr", post(ocr_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&ctx.config.allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Credentialed CORS for exactly one origin.
///
/// Requests from any other origin get no CORS headers. Credentials rule out
/// wildcard methods and headers, so both mirror the preflight request.
fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match HeaderValue::from_str(origin.trim()) {
        Ok(value) => AllowOrigin::list([value]),
        Err(e) => {
            warn!("Invalid CORS origin '{origin}' ({e}); cross-origin requests will be refused");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(ctx: Arc<OcrContext>, addr: SocketAddr) -> Result<(), OcrError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| OcrError::Internal(format!("cannot bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| OcrError::Internal(e.to_string()))?;

    info!("Server listening on http://{local}");
    info!("  GET  /health  - Health check");
    info!(
        "  POST /ocr     - OCR (multipart field '{}')",
        ctx.config.upload_field.as_str()
    );

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| OcrError::Internal(format!("server error: {e}")))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ocr_handler(
    State(ctx): State<Arc<OcrContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrOutput>, OcrError> {
    let limit = ctx.config.max_upload_bytes;
    let multipart = multipart.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => OcrError::PayloadTooLarge { limit },
        _ => OcrError::MalformedUpload(e.body_text()),
    })?;
    let document = read_upload(multipart, ctx.config.upload_field.as_str(), limit).await?;
    let output = run_ocr(&ctx, document).await?;
    Ok(Json(output))
}

/// Pull exactly one file out of the form field named `field_name`.
///
/// Other fields are skipped. The extension is checked before any bytes of
/// the file are buffered.
async fn read_upload(
    mut multipart: Multipart,
    field_name: &str,
    limit: usize,
) -> Result<UploadedDocument, OcrError> {
    let mut document = None;
    let mut count = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        count += 1;
        if count > 1 {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let mut upload = UploadedDocument::new(filename, Vec::new())?;
        upload.bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, limit))?
            .to_vec();
        document = Some(upload);
    }

    if count > 1 {
        return Err(OcrError::MultipleFiles {
            field: field_name.to_string(),
            count,
        });
    }
    document.ok_or_else(|| OcrError::MissingFile {
        field: field_name.to_string(),
    })
}

fn multipart_error(e: MultipartError, limit: usize) -> OcrError {
    match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => OcrError::PayloadTooLarge { limit },
        _ => OcrError::MalformedUpload(e.body_text()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
