use std::path::Path;

use crate::error::ScanError;

/// Lists loaded modules: every directory directly under the registry root,
/// sorted by name. An inaccessible root is the one fatal condition of a
/// refresh; everything below module granularity degrades instead.
pub async fn list_modules(root: &Path) -> Result<Vec<String>, ScanError> {
    let map_err = |source| ScanError::environment_unsupported(root.to_path_buf(), source);
    let mut dir = tokio::fs::read_dir(root).await.map_err(map_err)?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(map_err)? {
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(err) => {
                tracing::debug!(error = %err, entry = ?entry.file_name(), "skipping unreadable registry entry");
                continue;
            }
        };
        if !file_type.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => {
                tracing::debug!(entry = ?name, "skipping non-utf8 module name");
            }
        }
    }
    names.sort();
    tracing::debug!(count = names.len(), root = %root.display(), "scanned module registry");
    Ok(names)
}
