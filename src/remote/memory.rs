//! In-process remote store for tests and dry runs.

use super::{RemoteObject, RemoteStore};
use crate::error::SyncFault;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// One call made against a [`MemoryStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    /// Session established
    Authenticate,
    /// Folder listed
    List {
        /// Folder listed
        folder_id: String,
    },
    /// Object created
    Create {
        /// Object name
        name: String,
        /// Target folder
        folder_id: String,
    },
    /// Object content replaced
    Update {
        /// Replaced object
        object_id: String,
    },
}

#[derive(Default)]
struct Inner {
    objects: Vec<(RemoteObject, Vec<u8>)>,
    operations: Vec<StoreOperation>,
    next_id: u64,
    fail_remaining: usize,
    reject_auth: bool,
}

/// Remote store that keeps objects in memory.
///
/// `fail_next(n)` makes the next `n` non-auth calls fail with a
/// `SyncFault::Remote`, and `reject_auth()` makes authentication fail.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `calls` non-auth calls.
    pub fn fail_next(&self, calls: usize) {
        self.lock().fail_remaining = calls;
    }

    /// Fail every authentication from now on.
    pub fn reject_auth(&self) {
        self.lock().reject_auth = true;
    }

    /// `(name, content)` of every object in `folder_id`, in creation order.
    pub fn objects_in(&self, folder_id: &str) -> Vec<(String, Vec<u8>)> {
        self.lock()
            .objects
            .iter()
            .filter(|(obj, _)| obj.folder_id == folder_id)
            .map(|(obj, content)| (obj.name.clone(), content.clone()))
            .collect()
    }

    /// Calls made so far.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    fn record(&self, op: StoreOperation) -> Result<MutexGuard<'_, Inner>, SyncFault> {
        let mut inner = self.lock();
        let label = format!("{op:?}");
        inner.operations.push(op);
        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(SyncFault::Remote {
                operation: label,
                message: "injected failure".to_string(),
            });
        }
        Ok(inner)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn authenticate(&self) -> Result<(), SyncFault> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::Authenticate);
        if inner.reject_auth {
            return Err(SyncFault::Auth("credentials rejected".to_string()));
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteObject>, SyncFault> {
        let inner = self.record(StoreOperation::List {
            folder_id: folder_id.to_string(),
        })?;
        Ok(inner
            .objects
            .iter()
            .map(|(obj, _)| obj)
            .filter(|obj| obj.folder_id == folder_id)
            .filter(|obj| name.map_or(true, |n| obj.name == n))
            .cloned()
            .collect())
    }

    async fn create_object(
        &self,
        name: &str,
        folder_id: &str,
        content: &[u8],
    ) -> Result<RemoteObject, SyncFault> {
        let mut inner = self.record(StoreOperation::Create {
            name: name.to_string(),
            folder_id: folder_id.to_string(),
        })?;
        inner.next_id += 1;
        let object = RemoteObject {
            id: format!("obj-{}", inner.next_id),
            name: name.to_string(),
            folder_id: folder_id.to_string(),
        };
        inner.objects.push((object.clone(), content.to_vec()));
        Ok(object)
    }

    async fn update_object_content(
        &self,
        object_id: &str,
        content: &[u8],
    ) -> Result<(), SyncFault> {
        let mut inner = self.record(StoreOperation::Update {
            object_id: object_id.to_string(),
        })?;
        match inner.objects.iter_mut().find(|(obj, _)| obj.id == object_id) {
            Some((_, stored)) => {
                *stored = content.to_vec();
                Ok(())
            }
            None => Err(SyncFault::NotFound(object_id.to_string())),
        }
    }
}
