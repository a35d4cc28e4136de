//! JSON data file holding the store image between invocations.

use std::path::Path;

use ooh_storage::{MemoryStore, StoreImage};

/// Load the store from `path`. A missing file yields an empty store.
pub(crate) fn load(path: &Path) -> Result<MemoryStore, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "data file absent, starting empty");
        return Ok(MemoryStore::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading data file '{}': {}", path.display(), e))?;
    let image: StoreImage = serde_json::from_str(&contents)
        .map_err(|e| format!("error parsing data file '{}': {}", path.display(), e))?;
    Ok(MemoryStore::from_image(image))
}

/// Write the store image to `path` through a sibling temp file and rename.
pub(crate) fn save(store: &MemoryStore, path: &Path) -> Result<(), String> {
    let image = store
        .image()
        .map_err(|e| format!("error exporting store: {}", e))?;
    let json = serde_json::to_string_pretty(&image)
        .map_err(|e| format!("error serializing store: {}", e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| format!("error writing data file '{}': {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| format!("error writing data file '{}': {}", path.display(), e))
}
