use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{UploadError, UploadResult};
use crate::format;
use crate::source::FileHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Selected,
    InProgress,
    Done,
}

impl UploadStatus {
    /// Only single forward steps are allowed.
    pub fn can_advance_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Selected, Self::InProgress) | (Self::InProgress, Self::Done)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Selected => "SELECTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Upload {
    pub id: String,
    pub file: FileHandle,
    pub size_label: String,
    pub status: UploadStatus,
    pub upload_status: Option<String>,
    pub bytes_sent: u64,
    pub speed: u64, // bytes per second
}

impl Upload {
    fn new(id: String, file: FileHandle) -> Self {
        Self {
            id,
            size_label: format::file_size(file.size),
            file,
            status: UploadStatus::Selected,
            upload_status: None,
            bytes_sent: 0,
            speed: 0,
        }
    }

    fn advance(&mut self, next: UploadStatus) -> UploadResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(UploadError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Shared id → upload map.
#[derive(Clone, Default)]
pub struct Uploads {
    inner: Arc<Mutex<HashMap<String, Upload>>>,
}

impl Uploads {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Upload>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, files: Vec<FileHandle>) -> Vec<String> {
        files
            .into_iter()
            .map(|file| {
                let id = new_id();
                self.insert(id.clone(), file);
                id
            })
            .collect()
    }

    /// Insert under a pre-generated id (dropped files are staged under it).
    pub fn insert(&self, id: String, file: FileHandle) {
        tracing::info!("Selected {} ({} bytes) as {}", file.name, file.size, id);
        self.lock().insert(id.clone(), Upload::new(id, file));
    }

    pub fn remove(&self, id: &str) -> Option<Upload> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Upload> {
        self.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, Upload> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn begin(&self, id: &str) -> UploadResult<Upload> {
        self.update(id, |upload| {
            upload.advance(UploadStatus::InProgress)?;
            upload.bytes_sent = 0;
            upload.upload_status = Some("0%".to_string());
            Ok(())
        })
    }

    pub fn progress(&self, id: &str, loaded: u64, total: u64) -> UploadResult<Upload> {
        self.update(id, |upload| {
            if upload.status == UploadStatus::InProgress {
                upload.bytes_sent = loaded;
                upload.upload_status = Some(format::percent(loaded, total));
            }
            Ok(())
        })
    }

    pub fn finish(&self, id: &str) -> UploadResult<Upload> {
        self.update(id, |upload| {
            upload.advance(UploadStatus::Done)?;
            upload.bytes_sent = upload.file.size;
            upload.speed = 0;
            upload.upload_status = Some("100%".to_string());
            Ok(())
        })
    }

    /// Applies `f` to every entry under one lock.
    pub fn for_each_mut(&self, mut f: impl FnMut(&str, &mut Upload)) {
        for (id, upload) in self.lock().iter_mut() {
            f(id, upload);
        }
    }

    fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut Upload) -> UploadResult<()>,
    ) -> UploadResult<Upload> {
        let mut uploads = self.lock();
        let upload = uploads.get_mut(id).ok_or_else(|| UploadError::NotFound {
            id: id.to_string(),
        })?;
        f(upload)?;
        Ok(upload.clone())
    }
}
