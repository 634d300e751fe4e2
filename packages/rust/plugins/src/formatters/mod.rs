//! Built-in formatters.

mod html;
mod json;

pub use html::HtmlFormatter;
pub use json::JsonFormatter;

use std::path::Path;

use archivist_core::StageResult;
use archivist_shared::{ArchivistError, Media, hash_bytes};

/// Write a rendered artifact into the scratch dir and describe it as media.
async fn write_artifact(dir: &Path, file_name: String, content: &str, key: &str) -> StageResult<Media> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ArchivistError::io(dir, e))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| ArchivistError::io(&path, e))?;
    Ok(Media::new(path, hash_bytes(content.as_bytes())).with_key(key))
}
