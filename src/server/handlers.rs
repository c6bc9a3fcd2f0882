use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio_util::io::ReaderStream;

use crate::error::{Result, SyncError};
use crate::server::AppState;

/// Multipart field carrying the uploaded bytes and original filename
pub const UPLOAD_FIELD: &str = "file";

/// Handle POST /upload/
///
/// Streams the `file` field into the content directory and records the arrival
/// only after the bytes are durably in place.
pub async fn handle_upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::error!("Malformed upload body: {}", e.body_text());
                return message_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to upload file: {}", e.body_text()),
                );
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => {
                return message_response(
                    StatusCode::BAD_REQUEST,
                    "Upload field 'file' has no filename".to_string(),
                );
            }
        };

        return match ingest(&state, &filename, field).await {
            Ok((timestamp, bytes)) => {
                log::info!("Stored {} ({} bytes) at {:.6}", filename, bytes, timestamp);
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "filename": filename,
                        "status": "success"
                    })),
                )
                    .into_response()
            }
            Err(e) => {
                log::error!("Upload of {} failed: {}", filename, e);
                message_response(status_for(&e), format!("Failed to upload file: {}", e))
            }
        };
    }

    message_response(
        StatusCode::BAD_REQUEST,
        format!("Missing multipart field '{}'", UPLOAD_FIELD),
    )
}

/// Write one upload to disk, then record it. Returns (arrival timestamp, bytes written).
async fn ingest(state: &AppState, filename: &str, mut field: Field<'_>) -> Result<(f64, u64)> {
    let mut staged = state.content.begin(filename).await?;

    loop {
        let chunk = field.chunk().await.map_err(|e| {
            SyncError::Storage(format!(
                "upload stream for {} interrupted: {}",
                filename,
                e.body_text()
            ))
        })?;
        match chunk {
            Some(bytes) => staged.write_chunk(&bytes).await?,
            None => break,
        }
    }

    let written = staged.commit().await?;
    let timestamp = state.recency.record(filename);
    Ok((timestamp, written))
}

/// Handle GET /check_new_files/{since_timestamp}
pub async fn handle_check_new_files(
    State(state): State<AppState>,
    Path(since_timestamp): Path<String>,
) -> Response {
    let since: f64 = match since_timestamp.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            return message_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid timestamp: {}", since_timestamp),
            );
        }
    };

    let new_files = state.recency.query(since);
    log::debug!("check_new_files since {}: {} file(s)", since, new_files.len());

    (
        StatusCode::OK,
        Json(serde_json::json!({ "new_files": new_files })),
    )
        .into_response()
}

/// Handle GET /download/{filename}
pub async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let (file, len) = match state.content.open(&filename).await {
        Ok(opened) => opened,
        Err(SyncError::NotFound(_)) => {
            return message_response(StatusCode::NOT_FOUND, "File not found".to_string());
        }
        Err(e) => {
            log::warn!("Download of {:?} failed: {}", filename, e);
            return message_response(status_for(&e), e.to_string());
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        body,
    )
        .into_response()
}

/// Handle health check endpoint
pub async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "pixelsync",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::InvalidFilename(_) | SyncError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

/// `attachment` disposition with an ASCII fallback name plus the RFC 5987 UTF-8 form
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect();
    let fallback = if ascii.is_empty() { "file" } else { ascii.as_str() };
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("photo.jpg"),
            "attachment; filename=\"photo.jpg\"; filename*=UTF-8''photo%2Ejpg"
        );
    }

    #[test]
    fn test_content_disposition_strips_unsafe_fallback_chars() {
        let value = content_disposition("my \"best\"; shot.jpg");
        assert!(value.starts_with("attachment; filename=\"my best shot.jpg\""));
    }

    #[test]
    fn test_content_disposition_non_ascii_fallback() {
        let value = content_disposition("日本.png");
        assert!(value.contains("filename=\".png\""));
        assert!(value.contains("filename*=UTF-8''%E6%97%A5%E6%9C%AC%2Epng"));
    }

    #[test]
    fn test_status_for_errors() {
        assert_eq!(
            status_for(&SyncError::InvalidFilename("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&SyncError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&SyncError::Storage("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
