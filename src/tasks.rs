use crate::state::AppState;
use crate::uploads::UploadStatus;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

pub fn start_background_tasks(state: AppState) {
    // Upload speed calculator + progress broadcaster
    tokio::spawn(async move {
        info!("Progress broadcaster started.");
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut last_bytes_map: HashMap<String, u64> = HashMap::new();

        loop {
            interval.tick().await;
            tick(&state, &mut last_bytes_map);
        }
    });
}

/// One broadcaster step: refresh speeds, then publish if anything is listed.
fn tick(state: &AppState, last_bytes_map: &mut HashMap<String, u64>) {
    let mut current_ids = Vec::new();

    state.uploads.for_each_mut(|id, upload| {
        current_ids.push(id.to_string());
        if upload.status != UploadStatus::InProgress {
            upload.speed = 0;
            return;
        }

        let last = last_bytes_map.get(id).cloned().unwrap_or(0);
        let current = upload.bytes_sent;
        if current >= last {
            upload.speed = current - last;
        }
        last_bytes_map.insert(id.to_string(), current);
    });

    // Forget deleted uploads
    last_bytes_map.retain(|k, _| current_ids.contains(k));

    if !state.uploads.is_empty() {
        state.broadcast_uploads();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::source::FileHandle;
    use std::path::PathBuf;

    fn test_state() -> AppState {
        let settings = Settings {
            server_port: 0,
            data_dir: PathBuf::from("data"),
            sign_url: "http://localhost/sign-s3".to_string(),
            select_root: PathBuf::from("."),
            accept: "image/*".to_string(),
            max_drop_bytes: 1024,
            log_level: "info".to_string(),
        };
        AppState::new(settings, "http://localhost".to_string())
    }

    fn file(size: u64) -> FileHandle {
        FileHandle {
            name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            size,
            path: PathBuf::from("a.png"),
            staged: false,
        }
    }

    #[test]
    fn test_tick_computes_speed_and_broadcasts() {
        let state = test_state();
        let mut rx = state.tx.subscribe();
        let id = state.uploads.add(vec![file(1000)]).remove(0);
        let idle = state.uploads.add(vec![file(10)]).remove(0);
        state.uploads.begin(&id).unwrap();

        let mut last = HashMap::new();
        state.uploads.progress(&id, 300, 1000).unwrap();
        tick(&state, &mut last);
        assert_eq!(state.uploads.get(&id).unwrap().speed, 300);

        state.uploads.progress(&id, 450, 1000).unwrap();
        tick(&state, &mut last);
        assert_eq!(state.uploads.get(&id).unwrap().speed, 150);
        assert_eq!(state.uploads.get(&idle).unwrap().speed, 0);

        let msg: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "uploads");
        assert_eq!(msg["data"][&id]["status"], "IN_PROGRESS");

        state.uploads.remove(&id);
        tick(&state, &mut last);
        assert!(!last.contains_key(&id));
    }

    #[test]
    fn test_tick_quiet_when_empty() {
        let state = test_state();
        let mut rx = state.tx.subscribe();
        tick(&state, &mut HashMap::new());
        assert!(rx.try_recv().is_err());
    }
}
