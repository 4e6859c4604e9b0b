//! Remote synchronization of local log files.
//!
//! The remote side is a key/value object store: objects have a store-assigned
//! id and a name, and live inside a folder. [`RemoteSync`] implements the two
//! publishing policies on top of any [`RemoteStore`]:
//!
//! - [`SyncPolicy::UploadOnce`]: always create a new object. Used once at the
//!   end of a bounded session.
//! - [`SyncPolicy::Upsert`]: list the folder, overwrite the object whose name
//!   matches exactly, or create it if absent. Used after every row of a
//!   continuous session so one remote object tracks the growing file.
//!
//! Faults come back as [`SyncFault`]; callers decide whether they are fatal.

use crate::error::SyncFault;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub mod credentials;
pub mod directory;
pub mod memory;

pub use credentials::{AuthAction, CredentialCache, Credentials};
pub use directory::DirectoryStore;
pub use memory::{MemoryStore, StoreOperation};

/// An object as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Store-assigned identifier
    pub id: String,
    /// Name within the folder
    pub name: String,
    /// Containing folder
    pub folder_id: String,
}

/// Capability: remote object storage keyed by name within a folder.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Establish or refresh the session with the store.
    async fn authenticate(&self) -> Result<(), SyncFault>;

    /// List objects in `folder_id`, optionally narrowed to `name`.
    ///
    /// Stores may treat the name filter loosely; callers re-check names.
    async fn list_objects(
        &self,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteObject>, SyncFault>;

    /// Create a new object holding `content`.
    async fn create_object(
        &self,
        name: &str,
        folder_id: &str,
        content: &[u8],
    ) -> Result<RemoteObject, SyncFault>;

    /// Replace the content of an existing object.
    async fn update_object_content(&self, object_id: &str, content: &[u8])
        -> Result<(), SyncFault>;
}

/// How a local file is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Always create a new object
    UploadOnce,
    /// Replace the object with the same name, creating it if absent
    Upsert,
}

/// How the remote object name is derived from the local file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteNaming {
    /// `17-10-26.csv` stays `17-10-26.csv`
    #[default]
    WithExtension,
    /// `17-10-26.csv` becomes `17-10-26`
    WithoutExtension,
}

impl RemoteNaming {
    /// Remote name for `local_file`, `None` if it has no UTF-8 file name.
    pub fn remote_name(&self, local_file: &Path) -> Option<String> {
        let file_name = local_file.file_name()?.to_str()?;
        let name = match self {
            RemoteNaming::WithExtension => file_name,
            RemoteNaming::WithoutExtension => {
                file_name.strip_suffix(".csv").unwrap_or(file_name)
            }
        };
        Some(name.to_string())
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new object was created
    Created(RemoteObject),
    /// An existing object was replaced
    Updated(RemoteObject),
}

impl PublishOutcome {
    /// The object published to.
    pub fn object(&self) -> &RemoteObject {
        match self {
            PublishOutcome::Created(obj) | PublishOutcome::Updated(obj) => obj,
        }
    }
}

/// Publishes local files to a remote folder according to a [`SyncPolicy`].
#[derive(Clone)]
pub struct RemoteSync {
    store: Arc<dyn RemoteStore>,
    policy: SyncPolicy,
    naming: RemoteNaming,
}

impl RemoteSync {
    /// Publish through `store`.
    pub fn new(store: Arc<dyn RemoteStore>, policy: SyncPolicy, naming: RemoteNaming) -> Self {
        Self {
            store,
            policy,
            naming,
        }
    }

    /// Active policy.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Upload the whole content of `local_file` into `folder_id`.
    ///
    /// Each call starts from scratch: there is no partial-upload resume.
    #[tracing::instrument(skip(self), fields(policy = ?self.policy), err)]
    pub async fn publish(
        &self,
        local_file: &Path,
        folder_id: &str,
    ) -> Result<PublishOutcome, SyncFault> {
        let name = self.naming.remote_name(local_file).ok_or_else(|| SyncFault::LocalRead {
            path: local_file.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "local path has no UTF-8 file name",
            ),
        })?;
        let content = tokio::fs::read(local_file)
            .await
            .map_err(|source| SyncFault::LocalRead {
                path: local_file.to_path_buf(),
                source,
            })?;

        let outcome = match self.policy {
            SyncPolicy::UploadOnce => {
                let created = self.store.create_object(&name, folder_id, &content).await?;
                PublishOutcome::Created(created)
            }
            SyncPolicy::Upsert => {
                let existing = self
                    .store
                    .list_objects(folder_id, Some(&name))
                    .await?
                    .into_iter()
                    .find(|obj| obj.name == name);
                match existing {
                    Some(obj) => {
                        tracing::debug!(object_id = %obj.id, "Remote object exists, overwriting");
                        self.store.update_object_content(&obj.id, &content).await?;
                        PublishOutcome::Updated(obj)
                    }
                    None => {
                        let created =
                            self.store.create_object(&name, folder_id, &content).await?;
                        PublishOutcome::Created(created)
                    }
                }
            }
        };

        tracing::info!(
            name = %name,
            folder_id,
            bytes = content.len(),
            "Published {}",
            match &outcome {
                PublishOutcome::Created(_) => "new remote object",
                PublishOutcome::Updated(_) => "update to remote object",
            }
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn local_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn naming_with_and_without_extension() {
        let path = Path::new("Scanner_Files/17-10-26/17-10-26.csv");
        assert_eq!(
            RemoteNaming::WithExtension.remote_name(path).as_deref(),
            Some("17-10-26.csv")
        );
        assert_eq!(
            RemoteNaming::WithoutExtension.remote_name(path).as_deref(),
            Some("17-10-26")
        );
    }

    #[tokio::test]
    async fn upload_once_always_creates() {
        let tmp = TempDir::new().unwrap();
        let file = local_file(&tmp, "01-06-2024.csv", "a\n");
        let store = Arc::new(MemoryStore::new());
        let sync = RemoteSync::new(store.clone(), SyncPolicy::UploadOnce, RemoteNaming::default());

        sync.publish(&file, "folder").await.unwrap();
        sync.publish(&file, "folder").await.unwrap();

        assert_eq!(store.objects_in("folder").len(), 2);
    }

    #[tokio::test]
    async fn upsert_creates_then_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let file = local_file(&tmp, "17-10-26.csv", "row1\n");
        let store = Arc::new(MemoryStore::new());
        let sync = RemoteSync::new(store.clone(), SyncPolicy::Upsert, RemoteNaming::default());

        let first = sync.publish(&file, "folder").await.unwrap();
        assert!(matches!(first, PublishOutcome::Created(_)));

        std::fs::write(&file, "row1\nrow2\n").unwrap();
        let second = sync.publish(&file, "folder").await.unwrap();
        assert!(matches!(second, PublishOutcome::Updated(_)));
        assert_eq!(first.object().id, second.object().id);

        let objects = store.objects_in("folder");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].1, b"row1\nrow2\n".to_vec());
    }

    #[tokio::test]
    async fn upsert_match_is_case_sensitive_and_folder_scoped() {
        let tmp = TempDir::new().unwrap();
        let file = local_file(&tmp, "day.csv", "x\n");
        let store = Arc::new(MemoryStore::new());
        store.create_object("DAY.csv", "folder", b"other").await.unwrap();
        store.create_object("day.csv", "elsewhere", b"other").await.unwrap();

        let sync = RemoteSync::new(store.clone(), SyncPolicy::Upsert, RemoteNaming::default());
        let outcome = sync.publish(&file, "folder").await.unwrap();

        assert!(matches!(outcome, PublishOutcome::Created(_)));
        assert_eq!(store.objects_in("folder").len(), 2);
    }

    #[tokio::test]
    async fn upsert_without_extension_matches_stem() {
        let tmp = TempDir::new().unwrap();
        let file = local_file(&tmp, "17-10-26.csv", "x\n");
        let store = Arc::new(MemoryStore::new());
        store.create_object("17-10-26", "folder", b"old").await.unwrap();

        let sync = RemoteSync::new(store.clone(), SyncPolicy::Upsert, RemoteNaming::WithoutExtension);
        let outcome = sync.publish(&file, "folder").await.unwrap();

        assert!(matches!(outcome, PublishOutcome::Updated(_)));
        assert_eq!(store.objects_in("folder"), vec![("17-10-26".to_string(), b"x\n".to_vec())]);
    }

    #[tokio::test]
    async fn store_faults_are_returned_not_panicked() {
        let tmp = TempDir::new().unwrap();
        let file = local_file(&tmp, "day.csv", "x\n");
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);

        let sync = RemoteSync::new(store.clone(), SyncPolicy::Upsert, RemoteNaming::default());
        assert!(sync.publish(&file, "folder").await.is_err());
        // Next attempt starts from scratch and succeeds.
        assert!(sync.publish(&file, "folder").await.is_ok());
    }

    #[tokio::test]
    async fn missing_local_file_is_a_sync_fault() {
        let store = Arc::new(MemoryStore::new());
        let sync = RemoteSync::new(store, SyncPolicy::UploadOnce, RemoteNaming::default());
        let err = sync
            .publish(Path::new("/nonexistent/day.csv"), "folder")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncFault::LocalRead { .. }));
    }
}
