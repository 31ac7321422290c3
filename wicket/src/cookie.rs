//! Persisted cookie storage
//!
//! Modules get a single small persisted blob, capped at
//! [`wicket_shared::MAX_COOKIE_SIZE`] decoded bytes. On disk it is stored
//! base64-encoded, one file per module, written atomically via a temp file
//! and rename so a crash mid-write never leaves a torn cookie. A cookie
//! that fails to decode is treated as absent rather than fatal; the module
//! starts fresh and the next write replaces it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::warn;
use wicket_shared::MAX_COOKIE_SIZE;

pub struct CookieStore {
    dir: PathBuf,
}

impl CookieStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn cookie_path(&self, module_id: &str) -> PathBuf {
        self.dir.join(format!("{}.cookie", sanitize_id(module_id)))
    }

    /// Load the cookie for a module.
    ///
    /// Returns `None` when no cookie exists, when it is empty, or when the
    /// stored data is corrupt or oversized.
    pub fn load(&self, module_id: &str) -> Option<Vec<u8>> {
        let path = self.cookie_path(module_id);
        let encoded = fs::read_to_string(&path).ok()?;
        match BASE64.decode(encoded.trim()) {
            Ok(data) if data.is_empty() => None,
            Ok(data) if data.len() > MAX_COOKIE_SIZE => {
                warn!(module_id, size = data.len(), "stored cookie over size cap, ignoring");
                None
            }
            Ok(data) => Some(data),
            Err(e) => {
                warn!(module_id, error = %e, "corrupt cookie, starting fresh");
                None
            }
        }
    }

    /// Persist the cookie for a module, replacing any previous value.
    ///
    /// Oversized data is rejected and the stored cookie is left as it was.
    pub fn store(&self, module_id: &str, data: &[u8]) -> Result<()> {
        if data.len() > MAX_COOKIE_SIZE {
            anyhow::bail!(
                "cookie of {} bytes exceeds the {MAX_COOKIE_SIZE} byte cap",
                data.len()
            );
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cookie directory {}", self.dir.display()))?;

        let path = self.cookie_path(module_id);
        let tmp = path.with_extension("cookie.tmp");
        fs::write(&tmp, BASE64.encode(data))
            .with_context(|| format!("writing cookie temp file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("committing cookie file {}", path.display()))?;
        Ok(())
    }

    /// Remove a stored cookie if one exists.
    pub fn clear(&self, module_id: &str) -> Result<()> {
        let path = self.cookie_path(module_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing cookie file {}", path.display())),
        }
    }
}

/// Keep module ids filesystem-safe.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Default cookie directory under the platform data dir.
pub fn default_cookie_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("run", "wicket", "wicket")
        .map(|dirs| dirs.data_dir().join("cookies"))
}

/// Resolve the cookie directory, preferring an explicit override.
pub fn resolve_cookie_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }
    default_cookie_dir().context("no platform data directory available for cookies")
}
