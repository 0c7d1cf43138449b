use axum::{
    http::{StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// The drop zone / picker page and its assets.
#[derive(RustEmbed)]
#[folder = "frontend/dist/"]
pub struct Assets;

const INDEX: &str = "index.html";

pub async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let path = if path.is_empty() { INDEX } else { path };

    // Unknown paths fall back to the page itself.
    asset(path).unwrap_or_else(|| {
        asset(INDEX).unwrap_or_else(|| {
            (StatusCode::NOT_FOUND, "index.html not found in embedded assets").into_response()
        })
    })
}

fn asset(path: &str) -> Option<Response> {
    let content = Assets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some(([(CONTENT_TYPE, mime.as_ref().to_string())], content.data).into_response())
}
