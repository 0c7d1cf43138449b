use crate::config::Settings;
use crate::source::Accept;
use crate::uploads::Uploads;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Uploads,
    pub settings: Settings,
    pub accept: Accept,
    pub host_url: String,
    pub client: reqwest::Client,
    pub tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(settings: Settings, host_url: String) -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            uploads: Uploads::new(),
            accept: Accept::parse(&settings.accept),
            settings,
            host_url,
            client: reqwest::Client::new(),
            tx,
        }
    }

    /// Pushes the full registry to SSE listeners.
    pub fn broadcast_uploads(&self) {
        if let Ok(data) = serde_json::to_value(self.uploads.snapshot()) {
            let _ = self.tx.send(
                serde_json::json!({
                    "type": "uploads",
                    "data": data
                })
                .to_string(),
            );
        }
    }
}
