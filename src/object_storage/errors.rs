use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ObjectStorageError {
    #[error("Cannot upload object `{key:?}`: {raw_error_message:?}.")]
    CannotPutObject { key: String, raw_error_message: String },
    #[error("Cannot get object `{key:?}`: {raw_error_message:?}.")]
    CannotGetObject { key: String, raw_error_message: String },
    #[error("Cannot list objects with prefix `{prefix:?}`: {raw_error_message:?}.")]
    CannotListObjects { prefix: String, raw_error_message: String },
    #[error("Cannot delete object `{key:?}`: {raw_error_message:?}.")]
    CannotDeleteObject { key: String, raw_error_message: String },
    #[error("Object `{key:?}` not found.")]
    ObjectNotFound { key: String },
    #[error("File `{key:?}` is too large: {size_in_bytes} bytes, maximum allowed is {max_size_in_mb} MB.")]
    FileTooLarge {
        key: String,
        size_in_bytes: u64,
        max_size_in_mb: u32,
    },
}
