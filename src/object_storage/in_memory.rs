use crate::object_storage::errors::ObjectStorageError;
use crate::object_storage::{FileContent, ObjectStorage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local artifact store, used by tests and by deployments that have
/// no blob storage wired in.
pub struct InMemoryObjectStorage {
    objects: Mutex<BTreeMap<String, FileContent>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        InMemoryObjectStorage {
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        InMemoryObjectStorage::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), ObjectStorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<FileContent, ObjectStorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStorageError::ObjectNotFound { key: key.to_string() })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
