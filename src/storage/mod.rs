// Object storage for report photos

pub mod r2;

pub use r2::R2Backend;

use crate::error::AppResult;

/// Storage backend for uploaded images.
#[tonic::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload the object and return the URL clients should use to fetch it.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String>;

    /// Delete an object by key
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Bucket name
    fn bucket(&self) -> &str;
}

const IMAGE_PREFIX: &str = "items/";

/// Object key for a report photo.
pub fn image_key(id: uuid::Uuid, content_type: &str) -> String {
    let ext = match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "jpg",
    };
    format!("{}{}.{}", IMAGE_PREFIX, id, ext)
}

/// Recover the object key from a URL returned by [`StorageBackend::upload`].
pub fn object_key(url: &str) -> Option<&str> {
    url.rfind(IMAGE_PREFIX).map(|i| &url[i..])
}
