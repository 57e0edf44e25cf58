//! HTTP layer: one upload endpoint per registered document service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::Serialize;

use crate::documents::DEFAULT_THRESHOLD;
use crate::models::Record;
use crate::utils::DocumentError;
use crate::DocumentReader;

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Logical response envelope; the HTTP status carries the same information
/// for callers that prefer it.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ApiResponse {
    Ok { data: Record },
    Unclear { threshold: f64 },
    BadInput { message: String },
    Error { message: String },
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Builds the application router around a shared, immutable reader.
pub fn router(reader: Arc<DocumentReader>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/:service", post(analyze_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(reader)
}

/// Binds and serves until ctrl-c.
pub async fn serve(
    host: &str,
    port: u16,
    reader: Arc<DocumentReader>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("invalid address: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);

    axum::serve(listener, router(reader))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/{service}` with a multipart `file` part (png/jpg/jpeg) and an
/// optional `threshold` text part.
async fn analyze_handler(
    State(reader): State<Arc<DocumentReader>>,
    Path(service): Path<String>,
    mut multipart: Multipart,
) -> (StatusCode, Json<ApiResponse>) {
    let service = service.to_lowercase();
    if !reader.has_service(&service) {
        return bad_input(format!("Invalid service name '{}'.", service));
    }

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut raw_threshold: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_input(format!("Malformed multipart body: {}", e)),
        };
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((name, bytes.to_vec())),
                    Err(e) => return bad_input(format!("Failed to read file part: {}", e)),
                }
            }
            Some("threshold") => {
                raw_threshold = field.text().await.ok();
            }
            _ => {}
        }
    }

    let Some((file_name, image_bytes)) = file else {
        return bad_input("No file part in request.".to_string());
    };
    if !allowed_file(&file_name) {
        return bad_input(format!("File type of '{}' is not allowed.", file_name));
    }

    let threshold = extract_threshold(raw_threshold.as_deref());
    info!(
        "processing '{}' ({} bytes) with service '{}' at threshold {}",
        file_name,
        image_bytes.len(),
        service,
        threshold
    );

    let worker = reader.clone();
    let handle = tokio::task::spawn_blocking(move || {
        worker.read(&service, &image_bytes, threshold)
    });
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => {
            warn!("pipeline task failed: {}", e);
            return internal_error(format!("Pipeline task failed: {}", e));
        }
    };

    match result {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::Ok { data: record })),
        Ok(None) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(ApiResponse::Unclear { threshold }),
        ),
        Err(
            e @ (DocumentError::UnknownService(_)
            | DocumentError::InvalidArgumentType(_)
            | DocumentError::InvalidArgumentValue(_)
            | DocumentError::ImageProcessing(_)),
        ) => bad_input(e.to_string()),
        Err(e) => {
            warn!("pipeline error: {}", e);
            internal_error(e.to_string())
        }
    }
}

fn bad_input(message: String) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::BadInput { message }),
    )
}

fn internal_error(message: String) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::Error { message }),
    )
}

/// Parses an optional textual threshold: finite numbers are clamped to
/// `[0.1, 1.0]`; anything else falls back to the default.
fn extract_threshold(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .map(|t| t.clamp(0.1, 1.0))
        .unwrap_or(DEFAULT_THRESHOLD)
}

fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_defaults_when_absent_or_garbage() {
        assert_eq!(extract_threshold(None), 0.75);
        assert_eq!(extract_threshold(Some("")), 0.75);
        assert_eq!(extract_threshold(Some("abc")), 0.75);
        assert_eq!(extract_threshold(Some("NaN")), 0.75);
    }

    #[test]
    fn threshold_is_clamped_to_sane_bounds() {
        assert_eq!(extract_threshold(Some("0.5")), 0.5);
        assert_eq!(extract_threshold(Some("0.01")), 0.1);
        assert_eq!(extract_threshold(Some("7")), 1.0);
        assert_eq!(extract_threshold(Some(" 0.9 ")), 0.9);
    }

    #[test]
    fn only_image_extensions_are_allowed() {
        assert!(allowed_file("card.png"));
        assert!(allowed_file("card.JPG"));
        assert!(allowed_file("front.back.jpeg"));
        assert!(!allowed_file("card.pdf"));
        assert!(!allowed_file("card"));
    }

    #[test]
    fn responses_serialize_with_the_status_tag() {
        let ok = serde_json::to_value(ApiResponse::Ok {
            data: Record::new(),
        })
        .unwrap();
        assert_eq!(ok["status"], "ok");

        let unclear = serde_json::to_value(ApiResponse::Unclear { threshold: 0.75 }).unwrap();
        assert_eq!(unclear["status"], "unclear");
        assert_eq!(unclear["threshold"], 0.75);

        let bad = serde_json::to_value(ApiResponse::BadInput {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(bad["status"], "badInput");
    }
}
