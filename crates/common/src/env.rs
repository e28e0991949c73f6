//! Environment/runtime helpers
//!
//! Sanity checks on expected directories at startup.

use tracing::warn;

/// Warn when the static assets directory is missing; the API still serves.
/// Returns whether the directory exists.
pub async fn ensure_static_dir(static_dir: &str) -> bool {
    match tokio::fs::metadata(static_dir).await {
        Ok(meta) if meta.is_dir() => true,
        _ => {
            warn!(%static_dir, "static assets directory not found; static requests will 404");
            false
        }
    }
}
