//! Cookie persistence between separate process invocations.
//!
//! The file holds one cookie per line in `Set-Cookie` form. Only the
//! `name=value` part matters when loading back.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{CookieError, CookieJar};

impl CookieJar {
    /// Load cookies from `path` into this jar. A missing file is not an error.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, CookieError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "cookie file not found, starting empty");
            return Ok(0);
        }

        let content = fs::read_to_string(path)?;
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let before = self.len();
        self.ingest(&lines)?;
        debug!(path = %path.display(), loaded = lines.len(), "loaded cookie file");
        Ok(self.len().saturating_sub(before))
    }

    /// Write every cookie of this jar to `path`, replacing the file
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), CookieError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = self
            .iter()
            .map(|c| c.to_set_cookie())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(path, content)?;

        debug!(path = %path.display(), count = self.len(), "saved cookie file");
        Ok(())
    }
}
