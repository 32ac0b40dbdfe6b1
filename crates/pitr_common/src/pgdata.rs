//! Data directory access.
//!
//! The data directory is usually mode 0700 and owned by the DBSU. Reads are
//! tried directly first and repeated through the DBSU on permission errors.

use crate::exec::ExecContext;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Marker file of an initialized cluster
pub const PG_VERSION_FILE: &str = "PG_VERSION";

/// Read-only view of a data directory
pub trait DataDirInspector {
    fn exists(&self, dir: &Path) -> bool;

    /// `PG_VERSION` present
    fn is_initialized(&self, dir: &Path) -> bool {
        self.exists(&dir.join(PG_VERSION_FILE))
    }

    /// Entry names, `None` when the directory cannot be listed
    fn list(&self, dir: &Path) -> Option<Vec<String>>;

    /// File contents, `None` when missing or unreadable
    fn read(&self, path: &Path) -> Option<String>;
}

/// Filesystem access with DBSU fallback
#[derive(Debug, Clone)]
pub struct DbsuFs {
    ctx: ExecContext,
}

impl DbsuFs {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    fn via_dbsu(&self, args: &[&str]) -> Option<String> {
        match self.ctx.run_as_dbsu(args) {
            Ok(out) => Some(out),
            Err(e) => {
                debug!("dbsu fallback failed: {}", e);
                None
            }
        }
    }
}

impl DataDirInspector for DbsuFs {
    fn exists(&self, path: &Path) -> bool {
        match std::fs::symlink_metadata(path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let p = path.to_string_lossy().into_owned();
                self.via_dbsu(&["test", "-e", p.as_str()]).is_some()
            }
            Err(_) => false,
        }
    }

    fn list(&self, dir: &Path) -> Option<Vec<String>> {
        match std::fs::read_dir(dir) {
            Ok(entries) => Some(
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect(),
            ),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let d = dir.to_string_lossy().into_owned();
                self.via_dbsu(&["ls", "-A", d.as_str()]).map(|out| {
                    out.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect()
                })
            }
            Err(_) => None,
        }
    }

    fn read(&self, path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let p = path.to_string_lossy().into_owned();
                self.via_dbsu(&["cat", p.as_str()])
            }
            Err(_) => None,
        }
    }
}
