use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap},
    },
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::{UploadError, UploadResult};
use crate::source::{self, FileHandle};
use crate::state::AppState;
use crate::transfer;
use crate::uploads::{self, Upload};

pub async fn server_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ips = local_ip_address::list_afinet_netifas()
        .map(|list| {
            list.into_iter()
                .filter(|(_, ip)| ip.is_ipv4() && !ip.is_loopback())
                .map(|(_, ip)| ip.to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Json(serde_json::json!({
        "ips": ips,
        "port": state.settings.server_port,
        "host_url": state.host_url,
        "accept": state.settings.accept,
        "sign_url": state.settings.sign_url,
    }))
}

pub async fn list_uploads(State(state): State<AppState>) -> Json<HashMap<String, Upload>> {
    Json(state.uploads.snapshot())
}

pub async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> UploadResult<Json<Upload>> {
    state
        .uploads
        .get(&id)
        .map(Json)
        .ok_or(UploadError::NotFound { id })
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub paths: Vec<PathBuf>,
}

/// File-picker path: every path must exist under `select_root` and pass the
/// accept filter, otherwise nothing is added.
pub async fn select_files(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> UploadResult<Json<serde_json::Value>> {
    let mut files = Vec::with_capacity(req.paths.len());
    for path in &req.paths {
        let path = source::resolve_within(&state.settings.select_root, path).await?;
        let file = FileHandle::from_path(&path).await?;
        state.accept.check(&file)?;
        files.push(file);
    }

    let ids = state.uploads.add(files);
    state.broadcast_uploads();
    Ok(Json(serde_json::json!({ "ids": ids })))
}

/// Drop-zone path: one multipart part per file. All parts are staged before
/// any entry is registered; a failure discards everything staged so far.
pub async fn drop_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> UploadResult<Json<serde_json::Value>> {
    let staging_dir = state.settings.staging_dir();
    let mut staged: Vec<(String, FileHandle)> = Vec::new();

    if let Err(e) = stage_parts(&staging_dir, &mut multipart, &mut staged).await {
        warn!("Drop failed after {} file(s): {}", staged.len(), e);
        for (_, file) in &staged {
            if let Err(e) = file.discard().await {
                warn!("Failed to remove staged file {:?}: {}", file.path, e);
            }
        }
        return Err(e);
    }

    let ids: Vec<String> = staged.iter().map(|(id, _)| id.clone()).collect();
    for (id, file) in staged {
        state.uploads.insert(id, file);
    }

    info!("Dropped {} file(s)", ids.len());
    state.broadcast_uploads();
    Ok(Json(serde_json::json!({ "ids": ids })))
}

async fn stage_parts(
    staging_dir: &std::path::Path,
    multipart: &mut Multipart,
    staged: &mut Vec<(String, FileHandle)>,
) -> UploadResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.file_name().map(|s| s.to_string()) else {
            // Plain form fields carry no file.
            continue;
        };
        let mime_type = field.content_type().map(|s| s.to_string());
        let id = uploads::new_id();

        match source::stage(staging_dir, &id, &name, mime_type, field).await {
            Ok(file) => staged.push((id, file)),
            Err(e) => {
                // The partly written part is not in `staged` yet.
                let _ = tokio::fs::remove_dir_all(staging_dir.join(&id)).await;
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Raw bytes of an entry, for previews.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> UploadResult<impl IntoResponse> {
    let upload = state
        .uploads
        .get(&id)
        .ok_or_else(|| UploadError::NotFound { id: id.clone() })?;
    let file = File::open(&upload.file.path)
        .await
        .map_err(|_| UploadError::FileNotFound {
            path: upload.file.path.display().to_string(),
        })?;

    let content_type = if upload.file.mime_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        upload.file.mime_type.clone()
    };

    let mut headers = HeaderMap::new();
    if let Ok(val) = HeaderValue::from_str(&content_type) {
        headers.insert(CONTENT_TYPE, val);
    }
    if let Ok(val) = HeaderValue::from_str(&upload.file.size.to_string()) {
        headers.insert(CONTENT_LENGTH, val);
    }

    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

pub async fn start_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> UploadResult<(StatusCode, Json<Upload>)> {
    let upload = transfer::start_upload(&state, &id)?;
    Ok((StatusCode::ACCEPTED, Json(upload)))
}

pub async fn delete_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> UploadResult<StatusCode> {
    let upload = state
        .uploads
        .remove(&id)
        .ok_or_else(|| UploadError::NotFound { id: id.clone() })?;

    info!("Deleted upload: {} (ID: {})", upload.file.name, id);
    if let Err(e) = upload.file.discard().await {
        warn!("Failed to remove staged file {:?}: {}", upload.file.path, e);
    }

    state.broadcast_uploads();
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.tx.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).map(|msg| match msg {
        Ok(msg) => Ok(Event::default().data(msg)),
        Err(_) => Ok(Event::default().comment("keepalive")),
    });

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}
