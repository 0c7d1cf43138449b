//! File handles for uploads: user-selected local paths and files dropped
//! into the service, plus the picker's `accept` filter.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{UploadError, UploadResult};

#[derive(Clone, Debug, Serialize)]
pub struct FileHandle {
    pub name: String,
    /// Empty when unknown.
    pub mime_type: String,
    pub size: u64,
    #[serde(skip)]
    pub path: PathBuf,
    /// Bytes were written by us and are removed with the entry.
    #[serde(skip)]
    pub staged: bool,
}

impl FileHandle {
    pub async fn from_path(path: &Path) -> UploadResult<Self> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return Err(UploadError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        };

        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            mime_type: guess_mime(&name),
            name,
            size: metadata.len(),
            path: path.to_path_buf(),
            staged: false,
        })
    }

    /// Removes the staged copy, if any. Selected files are never touched.
    pub async fn discard(&self) -> std::io::Result<()> {
        if !self.staged {
            return Ok(());
        }
        tokio::fs::remove_file(&self.path).await?;
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

/// Canonicalizes `path` and requires it to live under `root`.
pub async fn resolve_within(root: &Path, path: &Path) -> UploadResult<PathBuf> {
    let root = tokio::fs::canonicalize(root).await?;
    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| UploadError::FileNotFound {
            path: path.display().to_string(),
        })?;

    if !resolved.starts_with(&root) {
        return Err(UploadError::OutsideRoot {
            path: path.display().to_string(),
        });
    }
    Ok(resolved)
}

pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_default()
}

/// Writes a dropped file to `<staging_dir>/<id>/<name>`.
pub async fn stage<S, E>(
    staging_dir: &Path,
    id: &str,
    name: &str,
    mime_type: Option<String>,
    chunks: S,
) -> UploadResult<FileHandle>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    // Client-supplied names are untrusted; keep only the last component.
    let name = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());

    let dir = staging_dir.join(id);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(&name);

    let mut chunks = std::pin::pin!(chunks);
    let mut file = tokio::fs::File::create(&path).await?;
    let mut size = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    let mime_type = mime_type
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| guess_mime(&name));

    Ok(FileHandle {
        name,
        mime_type,
        size,
        path,
        staged: true,
    })
}

#[derive(Clone, Debug)]
enum AcceptEntry {
    AnyOf(String),
    Exact(String),
    Extension(String),
}

/// HTML `accept` attribute semantics.
#[derive(Clone, Debug)]
pub struct Accept {
    entries: Vec<AcceptEntry>,
}

impl Accept {
    pub fn parse(list: &str) -> Self {
        let entries = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('.') {
                    AcceptEntry::Extension(s)
                } else if let Some(major) = s.strip_suffix("/*") {
                    AcceptEntry::AnyOf(format!("{}/", major))
                } else {
                    AcceptEntry::Exact(s)
                }
            })
            .collect();
        Self { entries }
    }

    pub fn allows(&self, file: &FileHandle) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let mime = file.mime_type.to_lowercase();
        let name = file.name.to_lowercase();
        self.entries.iter().any(|entry| match entry {
            AcceptEntry::AnyOf(prefix) => mime.starts_with(prefix.as_str()),
            AcceptEntry::Exact(exact) => mime == *exact,
            AcceptEntry::Extension(ext) => name.ends_with(ext.as_str()),
        })
    }

    pub fn check(&self, file: &FileHandle) -> UploadResult<()> {
        if self.allows(file) {
            Ok(())
        } else {
            Err(UploadError::UnsupportedType {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handle(name: &str) -> FileHandle {
        FileHandle {
            name: name.to_string(),
            mime_type: guess_mime(name),
            size: 0,
            path: PathBuf::from(name),
            staged: false,
        }
    }

    #[test]
    fn test_accept_wildcard() {
        let accept = Accept::parse("image/*");
        assert!(accept.allows(&handle("cat.png")));
        assert!(accept.allows(&handle("CAT.JPG")));
        assert!(!accept.allows(&handle("notes.txt")));
        assert!(!accept.allows(&handle("no_extension")));
    }

    #[test]
    fn test_accept_mixed_entries() {
        let accept = Accept::parse("application/pdf, .TXT");
        assert!(accept.allows(&handle("report.pdf")));
        assert!(accept.allows(&handle("notes.txt")));
        assert!(!accept.allows(&handle("cat.png")));
    }

    #[test]
    fn test_accept_empty_allows_all() {
        let accept = Accept::parse(" ");
        assert!(accept.allows(&handle("anything.bin")));
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"12345").unwrap();

        let file = FileHandle::from_path(&path).await.unwrap();
        assert_eq!(file.name, "photo.jpg");
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.size, 5);
        assert!(!file.staged);

        let missing = FileHandle::from_path(&dir.path().join("nope.jpg")).await;
        assert!(matches!(missing, Err(UploadError::FileNotFound { .. })));
        let directory = FileHandle::from_path(dir.path()).await;
        assert!(matches!(directory, Err(UploadError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_resolve_within() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let inner = root.path().join("cat.png");
        let stray = outside.path().join("dog.png");
        std::fs::write(&inner, b"x").unwrap();
        std::fs::write(&stray, b"x").unwrap();

        let resolved = resolve_within(root.path(), &inner).await.unwrap();
        assert!(resolved.ends_with("cat.png"));

        let escaped = root
            .path()
            .join("..")
            .join(outside.path().file_name().unwrap())
            .join("dog.png");
        assert!(matches!(
            resolve_within(root.path(), &escaped).await,
            Err(UploadError::OutsideRoot { .. })
        ));
        assert!(matches!(
            resolve_within(root.path(), &stray).await,
            Err(UploadError::OutsideRoot { .. })
        ));
        assert!(matches!(
            resolve_within(root.path(), &root.path().join("missing.png")).await,
            Err(UploadError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stage_strips_directories_and_discards() {
        let dir = tempdir().unwrap();
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ]);

        let file = stage(dir.path(), "id-1", "../../evil.png", None, chunks)
            .await
            .unwrap();
        assert_eq!(file.name, "evil.png");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size, 5);
        assert_eq!(file.path, dir.path().join("id-1").join("evil.png"));
        assert_eq!(std::fs::read(&file.path).unwrap(), b"abcde");

        file.discard().await.unwrap();
        assert!(!file.path.exists());
        assert!(!dir.path().join("id-1").exists());
    }
}
