//! Signed-URL handshake followed by a raw PUT of the file bytes.

use futures::StreamExt;
use reqwest::{
    Body, Client, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::error::{UploadError, UploadResult};
use crate::source::FileHandle;
use crate::state::AppState;
use crate::uploads::Upload;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    signed_request: String,
}

/// `GET <sign_url>?file-name=..&file-type=..` → `signedRequest`.
pub async fn get_signed_request(
    client: &Client,
    sign_url: &str,
    file: &FileHandle,
) -> UploadResult<String> {
    let resp = client
        .get(sign_url)
        .query(&[("file-name", &file.name), ("file-type", &file.mime_type)])
        .send()
        .await?;

    if resp.status() != StatusCode::OK {
        return Err(UploadError::SignedUrl {
            reason: format!("status {}", resp.status()),
        });
    }

    let body: SignResponse = resp
        .json()
        .await
        .map_err(|e| UploadError::SignedUrl {
            reason: e.to_string(),
        })?;
    Ok(body.signed_request)
}

/// Streams the file to `url`, calling `on_progress(loaded, total)` per chunk.
pub async fn put_file<F>(
    client: &Client,
    url: &str,
    file: &FileHandle,
    mut on_progress: F,
) -> UploadResult<()>
where
    F: FnMut(u64, u64) + Send + 'static,
{
    let total = file.size;
    let reader = File::open(&file.path).await?;

    let mut loaded = 0u64;
    let stream = ReaderStream::new(reader).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            loaded += bytes.len() as u64;
            on_progress(loaded, total);
        }
        chunk
    });

    let mut req = client
        .put(url)
        .header(CONTENT_LENGTH, total)
        .body(Body::wrap_stream(stream));
    if !file.mime_type.is_empty() {
        req = req.header(CONTENT_TYPE, file.mime_type.as_str());
    }

    let resp = req.send().await?;
    if resp.status() != StatusCode::OK {
        return Err(UploadError::PutRejected {
            status: resp.status().as_u16(),
        });
    }
    Ok(())
}

/// Marks `id` IN_PROGRESS and runs the transfer in the background.
///
/// A failed sign or PUT leaves the entry IN_PROGRESS; the failure is only
/// logged and announced on the event stream.
pub fn start_upload(state: &AppState, id: &str) -> UploadResult<Upload> {
    let upload = state.uploads.begin(id)?;
    state.broadcast_uploads();
    info!("Starting upload: {} (ID: {})", upload.file.name, id);

    let state = state.clone();
    let id = id.to_string();
    let file = upload.file.clone();
    tokio::spawn(async move {
        match run_upload(&state, &id, &file).await {
            Ok(()) => info!("Upload complete: {} (ID: {})", file.name, id),
            Err(e) => {
                error!("Upload failed: {} (ID: {}): {}", file.name, id, e);
                let _ = state.tx.send(
                    serde_json::json!({
                        "type": "upload_failed",
                        "id": id,
                        "error": e.to_string()
                    })
                    .to_string(),
                );
            }
        }
    });

    Ok(upload)
}

async fn run_upload(state: &AppState, id: &str, file: &FileHandle) -> UploadResult<()> {
    let signed = get_signed_request(&state.client, &state.settings.sign_url, file).await?;

    let uploads = state.uploads.clone();
    let progress_id = id.to_string();
    put_file(&state.client, &signed, file, move |loaded, total| {
        // Entry may have been deleted mid-flight.
        let _ = uploads.progress(&progress_id, loaded, total);
    })
    .await?;

    match state.uploads.finish(id) {
        Ok(_) => state.broadcast_uploads(),
        Err(UploadError::NotFound { .. }) => {
            tracing::debug!("Upload {} finished after being deleted", id)
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
