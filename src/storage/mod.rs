//! Storage-tree management: queries and structural mutations over a single
//! root directory. The filesystem is the source of truth; every listing
//! re-walks the tree, so reads are always consistent with disk.

pub mod naming;
pub mod paths;
pub mod tree;

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt, task};
use tracing::{debug, info};

use crate::{
    error::AppError,
    models::nodes::{Node, NodeKind, UploadedFile},
};

use paths::ResolvedPath;

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    max_upload_bytes: u64,
}

impl Storage {
    /// Opens the storage root, creating it if absent. The root directory
    /// itself is never a mutation target afterwards.
    pub fn new(root: impl Into<PathBuf>, max_upload_bytes: u64) -> Result<Self, AppError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_upload_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, logical: &str) -> Result<ResolvedPath, AppError> {
        paths::resolve(&self.root, logical)
    }

    /// Full tree from the storage root, ordered at every level.
    pub async fn list_tree(&self) -> Result<Vec<Node>, AppError> {
        let root = self.root.clone();
        run_walk(move || tree::build_tree(&root, "")).await
    }

    /// Direct children of a folder (each child folder carries its own
    /// subtree, since nodes are built by the same walk).
    pub async fn list_folder(&self, logical: &str) -> Result<Vec<Node>, AppError> {
        let resolved = self.resolve(logical)?;
        let metadata = fs::metadata(&resolved.absolute)
            .await
            .map_err(|err| not_found_or_storage(err, &resolved.logical))?;
        if !metadata.is_dir() {
            return Err(AppError::NotFound(resolved.logical));
        }

        let dir = resolved.absolute.clone();
        let prefix = resolved.logical.clone();
        run_walk(move || tree::build_tree(&dir, &prefix)).await
    }

    /// Single-node lookup by logical path. The empty path resolves to the
    /// root folder.
    pub async fn find_node(&self, logical: &str) -> Result<Node, AppError> {
        let resolved = self.resolve(logical)?;
        let metadata = fs::metadata(&resolved.absolute)
            .await
            .map_err(|err| not_found_or_storage(err, &resolved.logical))?;
        let modified_at = metadata.modified().ok().map(Into::into);

        if metadata.is_dir() {
            let children = {
                let dir = resolved.absolute.clone();
                let prefix = resolved.logical.clone();
                run_walk(move || tree::build_tree(&dir, &prefix)).await?
            };
            Ok(Node {
                name: resolved.file_name().to_string(),
                kind: NodeKind::Folder,
                path: resolved.logical,
                size: 0,
                modified_at,
                children: Some(children),
                download_ref: None,
            })
        } else {
            Ok(Node {
                name: resolved.file_name().to_string(),
                kind: NodeKind::File,
                path: resolved.logical.clone(),
                size: metadata.len(),
                modified_at,
                children: None,
                download_ref: Some(resolved.logical),
            })
        }
    }

    /// Reads a stored file for download. Folders and missing refs are both
    /// `NotFound`; the content type is guessed from the stored extension.
    pub async fn read_file(&self, storage_ref: &str) -> Result<(Vec<u8>, String), AppError> {
        let resolved = self.resolve(storage_ref)?;
        let metadata = fs::metadata(&resolved.absolute)
            .await
            .map_err(|err| not_found_or_storage(err, &resolved.logical))?;
        if metadata.is_dir() {
            return Err(AppError::NotFound(resolved.logical));
        }

        let bytes = fs::read(&resolved.absolute).await?;
        let mime = mime_guess::from_path(&resolved.absolute)
            .first_or_octet_stream()
            .to_string();
        Ok((bytes, mime))
    }

    /// Creates a folder under `parent_path`, along with any missing
    /// ancestors. The atomic `create_dir` on the final segment is the
    /// authority when two creators race: exactly one wins, the other gets
    /// `AlreadyExists`.
    pub async fn create_folder(&self, parent_path: &str, raw_name: &str) -> Result<String, AppError> {
        let parent = self.resolve(parent_path)?;
        let name = naming::sanitize_segment(raw_name)?;
        let target = parent.absolute.join(&name);
        let logical = paths::join_logical(&parent.logical, &name);

        if fs::try_exists(&target).await? {
            return Err(AppError::AlreadyExists(logical));
        }

        fs::create_dir_all(&parent.absolute).await?;
        match fs::create_dir(&target).await {
            Ok(()) => {
                info!(path = %logical, "created folder");
                Ok(logical)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(AppError::AlreadyExists(logical))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Opens an incremental sink for one uploaded file. The destination
    /// folder is materialized if it does not exist yet; bytes go straight to
    /// disk under a generated storage name.
    pub async fn begin_upload(
        &self,
        folder_path: &str,
        original_name: &str,
        mimetype: Option<String>,
    ) -> Result<UploadSink, AppError> {
        let destination = self.resolve(folder_path)?;
        let display_name = naming::sanitize_segment(original_name)?;
        fs::create_dir_all(&destination.absolute).await?;

        let stored_name = naming::storage_name(original_name);
        let absolute = destination.absolute.join(&stored_name);
        let storage_ref = paths::join_logical(&destination.logical, &stored_name);
        let logical_path = paths::join_logical(&destination.logical, &display_name);
        let mimetype = mimetype.unwrap_or_else(|| {
            mime_guess::from_path(original_name)
                .first_or_octet_stream()
                .to_string()
        });

        let file = fs::File::create(&absolute).await?;
        debug!(storage_ref = %storage_ref, "upload started");

        Ok(UploadSink {
            file,
            absolute,
            storage_ref,
            logical_path,
            original_name: original_name.to_string(),
            mimetype,
            written: 0,
            limit: self.max_upload_bytes,
        })
    }

    /// Renames a file or folder in place; children move with a folder.
    pub async fn rename(&self, old_path: &str, new_raw_name: &str) -> Result<String, AppError> {
        let old = self.resolve(old_path)?;
        if old.is_root() {
            return Err(AppError::InvalidPath(old_path.to_string()));
        }
        if !fs::try_exists(&old.absolute).await? {
            return Err(AppError::NotFound(old.logical));
        }

        let name = naming::sanitize_segment(new_raw_name)?;
        let parent_abs = old.absolute.parent().unwrap_or(&self.root).to_path_buf();
        let parent_logical = match old.logical.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        let target = parent_abs.join(&name);
        let new_logical = paths::join_logical(&parent_logical, &name);

        if fs::try_exists(&target).await? {
            return Err(AppError::AlreadyExists(new_logical));
        }

        fs::rename(&old.absolute, &target).await?;
        info!(from = %old.logical, to = %new_logical, "renamed entry");
        Ok(new_logical)
    }

    /// Removes each listed path, recursively for folders. Invalid and absent
    /// paths skip just that item; the returned list holds what was actually
    /// deleted.
    pub async fn delete(&self, items: &[String]) -> Result<Vec<String>, AppError> {
        let mut deleted = Vec::new();

        for item in items {
            let resolved = match self.resolve(item) {
                Ok(resolved) if !resolved.is_root() => resolved,
                _ => continue,
            };
            let metadata = match fs::metadata(&resolved.absolute).await {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };

            let removal = if metadata.is_dir() {
                fs::remove_dir_all(&resolved.absolute).await
            } else {
                fs::remove_file(&resolved.absolute).await
            };
            match removal {
                Ok(()) => {
                    info!(path = %resolved.logical, "deleted entry");
                    deleted.push(resolved.logical);
                }
                // Lost a race with a concurrent delete; same outcome.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(deleted)
    }
}

/// One in-flight upload. Chunks stream to disk as they arrive; crossing the
/// byte limit fails the write, after which the caller discards the sink and
/// the partial file with it.
pub struct UploadSink {
    file: fs::File,
    absolute: PathBuf,
    storage_ref: String,
    logical_path: String,
    original_name: String,
    mimetype: String,
    written: u64,
    limit: u64,
}

impl UploadSink {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        self.written += chunk.len() as u64;
        if self.written > self.limit {
            return Err(AppError::PayloadTooLarge(self.limit));
        }
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<UploadedFile, AppError> {
        self.file.flush().await?;
        debug!(storage_ref = %self.storage_ref, size = self.written, "upload finished");
        Ok(UploadedFile {
            original_name: self.original_name,
            storage_ref: self.storage_ref,
            path: self.logical_path,
            size: self.written,
            mimetype: self.mimetype,
        })
    }

    /// Drops the sink and removes whatever landed on disk.
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.absolute).await;
    }
}

async fn run_walk<F>(walk: F) -> Result<Vec<Node>, AppError>
where
    F: FnOnce() -> Vec<Node> + Send + 'static,
{
    task::spawn_blocking(walk)
        .await
        .map_err(|err| AppError::Storage(io::Error::other(err.to_string())))
}

fn not_found_or_storage(err: io::Error, logical: &str) -> AppError {
    if err.kind() == ErrorKind::NotFound {
        AppError::NotFound(logical.to_string())
    } else {
        AppError::Storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_storage(dir: &tempfile::TempDir) -> Storage {
        Storage::new(dir.path().join("root"), 1024).unwrap()
    }

    async fn upload_bytes(storage: &Storage, folder: &str, name: &str, bytes: &[u8]) -> UploadedFile {
        let mut sink = storage.begin_upload(folder, name, None).await.unwrap();
        sink.write_chunk(bytes).await.unwrap();
        sink.finish().await.unwrap()
    }

    #[tokio::test]
    async fn create_folder_then_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        assert_eq!(storage.create_folder("", "docs").await.unwrap(), "docs");
        assert!(matches!(
            storage.create_folder("", "docs").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn create_folder_materializes_missing_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let path = storage.create_folder("a/b", "c").await.unwrap();
        assert_eq!(path, "a/b/c");
        assert!(storage.find_node("a/b/c").await.unwrap().is_folder());
    }

    #[tokio::test]
    async fn concurrent_create_folder_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let (first, second) = tokio::join!(
            storage.create_folder("", "shared"),
            storage.create_folder("", "shared")
        );
        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in [first, second] {
            if let Err(err) = result {
                assert!(matches!(err, AppError::AlreadyExists(_)));
            }
        }
    }

    #[tokio::test]
    async fn upload_appears_in_tree_with_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let uploaded = upload_bytes(&storage, "docs", "note.txt", b"hello world").await;
        assert_eq!(uploaded.size, 11);
        assert_eq!(uploaded.path, "docs/note.txt");
        assert!(uploaded.storage_ref.starts_with("docs/"));
        assert!(uploaded.storage_ref.ends_with(".txt"));
        assert_eq!(uploaded.mimetype, "text/plain");

        let tree = storage.list_tree().await.unwrap();
        let docs = &tree[0];
        let files = docs.children.as_ref().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 11);
        assert_eq!(files[0].download_ref.as_deref(), Some(uploaded.storage_ref.as_str()));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_and_partial_removed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("root"), 8).unwrap();

        let mut sink = storage.begin_upload("", "big.bin", None).await.unwrap();
        let err = sink.write_chunk(&[0u8; 16]).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(8)));
        sink.discard().await;

        assert!(storage.list_tree().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_visibility_to_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let uploaded = upload_bytes(&storage, "docs", "data.csv", b"1,2,3").await;
        let old_ref = uploaded.storage_ref.clone();

        let new_path = storage.rename(&old_ref, "renamed.csv").await.unwrap();
        assert_eq!(new_path, "docs/renamed.csv");
        assert!(matches!(
            storage.find_node(&old_ref).await,
            Err(AppError::NotFound(_))
        ));
        let node = storage.find_node(&new_path).await.unwrap();
        assert_eq!(node.size, 5);
    }

    #[tokio::test]
    async fn rename_folder_carries_children() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage.create_folder("", "old").await.unwrap();
        upload_bytes(&storage, "old", "inner.txt", b"x").await;

        storage.rename("old", "new").await.unwrap();
        let children = storage.list_folder("new").await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(matches!(
            storage.list_folder("old").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_onto_existing_sibling_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage.create_folder("", "one").await.unwrap();
        storage.create_folder("", "two").await.unwrap();
        assert!(matches!(
            storage.rename("one", "two").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn batch_delete_skips_missing_and_invalid_items() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage.create_folder("", "keepable").await.unwrap();
        storage.create_folder("", "victim").await.unwrap();
        upload_bytes(&storage, "victim", "file.txt", b"bye").await;

        let deleted = storage
            .delete(&[
                "victim".into(),
                "missing".into(),
                "../escape".into(),
                String::new(),
            ])
            .await
            .unwrap();
        assert_eq!(deleted, vec!["victim".to_string()]);

        let tree = storage.list_tree().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "keepable");
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        assert!(matches!(
            storage.find_node("../../etc/passwd").await,
            Err(AppError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.create_folder("../outside", "x").await,
            Err(AppError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.read_file("../secret").await,
            Err(AppError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn read_file_serves_bytes_and_mime() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let uploaded = upload_bytes(&storage, "", "page.html", b"<html></html>").await;
        let (bytes, mime) = storage.read_file(&uploaded.storage_ref).await.unwrap();
        assert_eq!(bytes, b"<html></html>");
        assert_eq!(mime, "text/html");

        assert!(matches!(
            storage.read_file("nope.bin").await,
            Err(AppError::NotFound(_))
        ));
    }
}
