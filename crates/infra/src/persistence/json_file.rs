use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use scrapeshield_domain::Result;

use crate::errors::InfraError;

/// Read a JSON array from `path`; a missing or blank file is an empty list.
pub(crate) async fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Store file does not exist yet");
            return Ok(Vec::new());
        }
        Err(e) => return Err(InfraError::from(e).into()),
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    Ok(serde_json::from_slice(&data).map_err(InfraError::from)?)
}

/// Replace `path` with `items` rendered as a JSON array.
///
/// Writes a sibling temp file, syncs it, then renames over the target so
/// readers never observe a partial file.
pub(crate) async fn write_list<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let data = serde_json::to_vec_pretty(items).map_err(InfraError::from)?;
    let temp_path = temp_path(path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(InfraError::from)?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .await
        .map_err(InfraError::from)?;
    file.write_all(&data).await.map_err(InfraError::from)?;
    file.sync_all().await.map_err(InfraError::from)?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(InfraError::from)?;
    debug!(path = %path.display(), items = items.len(), bytes = data.len(), "Wrote store file");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(|| OsString::from("store"), OsString::from);
    name.push(".tmp");
    path.with_file_name(name)
}
