mod config;
mod error;
mod format;
mod handlers;
mod source;
mod state;
mod tasks;
mod transfer;
mod uploads;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use local_ip_address::local_ip;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info};

use crate::config::Settings;
use crate::handlers::{api, web};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting MultiUploader...");

    if !settings.staging_dir().exists() {
        std::fs::create_dir_all(settings.staging_dir())
            .expect("Failed to create staging directory");
    }

    let local_ip = local_ip().unwrap_or([127, 0, 0, 1].into());
    let host_url = format!("http://{}:{}", local_ip, settings.server_port);
    info!("Signing uploads via {}", settings.sign_url);

    let state = AppState::new(settings.clone(), host_url.clone());

    tasks::start_background_tasks(state.clone());

    // --- Router Setup ---
    let app = create_app(state);

    let port = settings.server_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on http://{}", addr);
    info!("Network address: {}", host_url);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

pub fn create_app(state: AppState) -> Router {
    let drop_limit = DefaultBodyLimit::max(state.settings.max_drop_bytes);

    Router::new()
        .route("/api/info", get(api::server_info))
        .route(
            "/api/uploads",
            get(api::list_uploads).post(api::drop_files).layer(drop_limit),
        )
        .route("/api/uploads/select", post(api::select_files))
        .route(
            "/api/uploads/{id}",
            get(api::get_upload).delete(api::delete_upload),
        )
        .route("/api/uploads/{id}/file", get(api::download_file))
        .route("/api/uploads/{id}/start", post(api::start_upload))
        .route("/events", get(api::sse_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback(web::static_handler)
}
