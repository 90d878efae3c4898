pub mod errors;
pub mod in_memory;

use crate::object_storage::errors::ObjectStorageError;
use async_trait::async_trait;
use uuid::Uuid;

pub type FileContent = Vec<u8>;

/// Boundary to the artifact store. Keys follow the
/// `{lob_id}/{team_id}/{job_id}/{file_name}` layout.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, content: &[u8]) -> Result<(), ObjectStorageError>;
    async fn get(&self, key: &str) -> Result<FileContent, ObjectStorageError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStorageError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStorageError>;
}

pub fn artifact_key(lob_id: &str, team_id: &str, job_id: Uuid, file_name: &str) -> String {
    format!("{lob_id}/{team_id}/{job_id}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_layout() {
        let job_id = Uuid::new_v4();
        assert_eq!(
            artifact_key("acme", "pay", job_id, "test-results.xml"),
            format!("acme/pay/{job_id}/test-results.xml")
        );
    }
}
