//! Filesystem collaborator: a writable overlay over a read-only bundle.
//!
//! Guest-visible paths are always relative. Reads check the overlay first and
//! fall back to the bundled root; writes only ever land in the overlay.
//! Parent-directory traversal and home-directory tokens are rejected outright.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, warn};

/// Writes into the reserved system prefix are refused.
const SYSTEM_PREFIX: &str = "system/";

/// Cap on a single written file.
const MAX_WRITE_LEN: usize = 10 * 1024 * 1024;

pub struct FileSystem {
    overlay: PathBuf,
    bundled: Option<PathBuf>,
}

impl FileSystem {
    /// Overlay-only store. The root is created if missing.
    pub fn new(overlay: impl Into<PathBuf>) -> std::io::Result<Self> {
        let overlay = overlay.into();
        fs::create_dir_all(&overlay)?;
        Ok(Self {
            overlay,
            bundled: None,
        })
    }

    /// Overlay plus a read-only bundled root checked second.
    pub fn with_bundled(
        overlay: impl Into<PathBuf>,
        bundled: impl Into<PathBuf>,
    ) -> std::io::Result<Self> {
        let mut this = Self::new(overlay)?;
        this.bundled = Some(bundled.into());
        Ok(this)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Read a text file, overlay before bundle. Absent (or rejected) paths
    /// read as None.
    pub fn read(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path)?;
        match fs::read_to_string(&resolved) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("read failed for {:?}: {}", resolved, e);
                None
            }
        }
    }

    /// Read raw bytes (sprite sheets and other assets).
    pub fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let resolved = self.resolve(path)?;
        match fs::read(&resolved) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("read failed for {:?}: {}", resolved, e);
                None
            }
        }
    }

    /// Write into the overlay, creating parent directories. Returns false on
    /// rejected paths, oversized bodies, the system prefix, or i/o failure.
    pub fn write(&self, path: &str, content: &str) -> bool {
        self.write_bytes(path, content.as_bytes())
    }

    /// Byte-level twin of `write`, used for sprite sheets and other assets.
    pub fn write_bytes(&self, path: &str, content: &[u8]) -> bool {
        let Some(rel) = clean(path) else {
            return false;
        };
        if rel.starts_with(SYSTEM_PREFIX) {
            warn!("write refused under system prefix: {}", rel);
            return false;
        }
        if content.len() > MAX_WRITE_LEN {
            warn!("write refused, {} bytes is over the cap", content.len());
            return false;
        }
        let target = self.overlay.join(&rel);
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("mkdir failed for {:?}: {}", parent, e);
                return false;
            }
        }
        match fs::write(&target, content) {
            Ok(()) => true,
            Err(e) => {
                error!("write failed for {:?}: {}", target, e);
                false
            }
        }
    }

    /// Names in a directory, directories suffixed with '/'. Lists whichever
    /// root resolves the path (overlay wins), sorted for stable output.
    pub fn list(&self, path: &str) -> Vec<String> {
        let Some(dir) = self.resolve_dir(path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| {
                    let mut name = e.file_name().to_string_lossy().into_owned();
                    if e.path().is_dir() {
                        name.push('/');
                    }
                    name
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// First root that has the file: overlay, then bundle.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = clean(path)?;
        let in_overlay = self.overlay.join(&rel);
        if in_overlay.is_file() {
            return Some(in_overlay);
        }
        if let Some(bundled) = &self.bundled {
            let in_bundle = bundled.join(&rel);
            if in_bundle.is_file() {
                return Some(in_bundle);
            }
        }
        None
    }

    fn resolve_dir(&self, path: &str) -> Option<PathBuf> {
        let rel = clean(path)?;
        let in_overlay = self.overlay.join(&rel);
        if in_overlay.is_dir() {
            return Some(in_overlay);
        }
        if let Some(bundled) = &self.bundled {
            let in_bundle = bundled.join(&rel);
            if in_bundle.is_dir() {
                return Some(in_bundle);
            }
        }
        None
    }
}

/// Normalize a guest path: forward slashes, no leading '/', and absolutely no
/// `..` or `~` components.
fn clean(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    if path.contains("..") || path.contains('~') {
        warn!("rejected path: {}", path);
        return None;
    }
    let trimmed = path.trim_start_matches('/');
    // refuse windows-style drive roots as well
    if Path::new(trimmed).is_absolute() || trimmed.contains(':') {
        warn!("rejected path: {}", path);
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, tempfile::TempDir, FileSystem) {
        let overlay = tempfile::tempdir().unwrap();
        let bundle = tempfile::tempdir().unwrap();
        fs::create_dir_all(bundle.path().join("system")).unwrap();
        fs::write(bundle.path().join("system/boot.mns"), "-- boot").unwrap();
        fs::write(bundle.path().join("readme.txt"), "bundled").unwrap();
        let fsys = FileSystem::with_bundled(overlay.path(), bundle.path()).unwrap();
        (overlay, bundle, fsys)
    }

    #[test]
    fn overlay_shadows_the_bundle() {
        let (_overlay, _bundle, fsys) = fixture();
        assert_eq!(fsys.read("readme.txt").as_deref(), Some("bundled"));
        assert!(fsys.write("readme.txt", "mine"));
        assert_eq!(fsys.read("readme.txt").as_deref(), Some("mine"));
    }

    #[test]
    fn bundled_files_resolve_and_exist() {
        let (_overlay, _bundle, fsys) = fixture();
        assert!(fsys.exists("system/boot.mns"));
        assert_eq!(fsys.read("system/boot.mns").as_deref(), Some("-- boot"));
        assert!(!fsys.exists("nope.mns"));
        assert!(fsys.read("nope.mns").is_none());
    }

    #[test]
    fn traversal_and_home_tokens_are_rejected() {
        let (_overlay, _bundle, fsys) = fixture();
        assert!(!fsys.exists("../system/boot.mns"));
        assert!(fsys.read("a/../b").is_none());
        assert!(!fsys.write("~/evil", "x"));
        assert!(!fsys.write("../evil", "x"));
    }

    #[test]
    fn system_prefix_is_read_only() {
        let (_overlay, _bundle, fsys) = fixture();
        assert!(!fsys.write("system/boot.mns", "pwned"));
        assert_eq!(fsys.read("system/boot.mns").as_deref(), Some("-- boot"));
    }

    #[test]
    fn writes_create_parents_and_list_shows_them() {
        let (_overlay, _bundle, fsys) = fixture();
        assert!(fsys.write("projects/demo/main.mns", "x = 1"));
        let names = fsys.list("projects");
        assert_eq!(names, vec!["demo/".to_string()]);
        let files = fsys.list("projects/demo");
        assert_eq!(files, vec!["main.mns".to_string()]);
    }
}
