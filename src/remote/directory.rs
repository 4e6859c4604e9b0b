//! Filesystem-backed remote store.
//!
//! Suited to a mounted network share or a folder kept in sync by an external
//! agent. Layout under the store root:
//!
//! ```text
//! <root>/index.json        [{ "id", "name", "folder_id" }, ...]
//! <root>/objects/<id>      object content
//! ```
//!
//! Folders are logical: an object belongs to the folder recorded in the index.
//! Content and index are replaced via write-to-temp then rename, so a reader
//! never observes a half-written object.

use super::{CredentialCache, Credentials, RemoteObject, RemoteStore};
use crate::error::SyncFault;
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const INDEX_FILE: &str = "index.json";
const OBJECTS_DIR: &str = "objects";

/// Remote store kept under a local directory.
pub struct DirectoryStore {
    root: PathBuf,
    credentials: CredentialCache,
    session: Mutex<Option<Credentials>>,
    index_lock: Mutex<()>,
}

impl DirectoryStore {
    /// Store rooted at `root`, authenticating through `credentials`.
    pub fn new(root: impl Into<PathBuf>, credentials: CredentialCache) -> Self {
        Self {
            root: root.into(),
            credentials,
            session: Mutex::new(None),
            index_lock: Mutex::new(()),
        }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(id)
    }

    /// Require an authenticated session, refreshing it if it expired.
    async fn require_session(&self) -> Result<(), SyncFault> {
        let mut session = self.session.lock().await;
        match session.as_ref() {
            None => Err(SyncFault::Auth(
                "not authenticated with the remote store".to_string(),
            )),
            Some(creds) if creds.is_expired(Utc::now()) => {
                tracing::info!("Remote session expired, refreshing credentials");
                let (fresh, _) = self.credentials.authorize(Utc::now()).await?;
                *session = Some(fresh);
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    async fn read_index(&self) -> Result<Vec<RemoteObject>, SyncFault> {
        match tokio::fs::read_to_string(self.index_path()).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, index: &[RemoteObject]) -> Result<(), SyncFault> {
        let json = serde_json::to_vec_pretty(index)?;
        replace_file(&self.index_path(), &json).await
    }
}

async fn replace_file(path: &Path, content: &[u8]) -> Result<(), SyncFault> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    #[tracing::instrument(skip(self), fields(root = %self.root.display()), err)]
    async fn authenticate(&self) -> Result<(), SyncFault> {
        tokio::fs::create_dir_all(self.root.join(OBJECTS_DIR))
            .await
            .map_err(|e| {
                SyncFault::Auth(format!(
                    "store root '{}' is not reachable: {e}",
                    self.root.display()
                ))
            })?;
        let (creds, action) = self.credentials.authorize(Utc::now()).await?;
        tracing::info!(action = ?action, "Authenticated with remote store");
        *self.session.lock().await = Some(creds);
        Ok(())
    }

    async fn list_objects(
        &self,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteObject>, SyncFault> {
        self.require_session().await?;
        let _guard = self.index_lock.lock().await;
        Ok(self
            .read_index()
            .await?
            .into_iter()
            .filter(|obj| obj.folder_id == folder_id)
            .filter(|obj| name.map_or(true, |n| obj.name == n))
            .collect())
    }

    async fn create_object(
        &self,
        name: &str,
        folder_id: &str,
        content: &[u8],
    ) -> Result<RemoteObject, SyncFault> {
        self.require_session().await?;
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;

        let object = RemoteObject {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            folder_id: folder_id.to_string(),
        };
        replace_file(&self.object_path(&object.id), content).await?;
        index.push(object.clone());
        self.write_index(&index).await?;
        Ok(object)
    }

    async fn update_object_content(
        &self,
        object_id: &str,
        content: &[u8],
    ) -> Result<(), SyncFault> {
        self.require_session().await?;
        let _guard = self.index_lock.lock().await;
        let index = self.read_index().await?;
        if !index.iter().any(|obj| obj.id == object_id) {
            return Err(SyncFault::NotFound(object_id.to_string()));
        }
        replace_file(&self.object_path(object_id), content).await
    }
}
