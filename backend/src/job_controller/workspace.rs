//! Per-job directories under the configured work directory.
//!
//! ```text
//! <work_dir>/jobs/<job_id>/
//!     uploads/              template, roster and SVG as received
//!     <output_directory>/   certificates, data.json, verification site
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const JOBS_DIR: &str = "jobs";
pub const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Output directory '{0}' must be a relative path without '..'")]
    InvalidOutputDirectory(String),
}

/// Checks that `value` names a directory inside the job directory.
pub fn relative_output_dir(value: &str) -> Result<PathBuf, WorkspaceError> {
    let invalid = || WorkspaceError::InvalidOutputDirectory(value.to_string());
    let path = Path::new(value.trim());

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }

    if clean.as_os_str().is_empty() || clean.starts_with(UPLOADS_DIR) {
        return Err(invalid());
    }
    Ok(clean)
}

/// Whether `path`, relative to the jobs root, may be served over HTTP.
/// Uploaded inputs stay private; everything a job wrote is public.
pub fn is_public_path(path: &Path) -> bool {
    let mut components = path.components();
    let job_dir = components.next();
    let top = components.next();
    matches!(job_dir, Some(Component::Normal(_)))
        && !matches!(top, Some(Component::Normal(name)) if name == UPLOADS_DIR)
        && components.all(|c| matches!(c, Component::Normal(_)))
}

/// The directory holding every job, `<work_dir>/jobs`.
pub fn jobs_root(work_dir: &Path) -> PathBuf {
    work_dir.join(JOBS_DIR)
}

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub fn create(work_dir: &Path, job_id: &str) -> Result<Self, WorkspaceError> {
        let root = jobs_root(work_dir).join(job_id);
        fs::create_dir_all(root.join(UPLOADS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores an uploaded file as `uploads/<stem>.<extension>`.
    pub fn persist_upload(
        &self,
        stem: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.root.join(UPLOADS_DIR).join(format!("{stem}.{extension}"));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn output_dir(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// `path` relative to the job directory, for reporting to clients.
    pub fn display_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_directories() {
        assert_eq!(relative_output_dir("certs").unwrap(), PathBuf::from("certs"));
        assert_eq!(relative_output_dir("./a/b/").unwrap(), PathBuf::from("a/b"));
    }

    #[test]
    fn rejects_escaping_or_empty_directories() {
        for value in ["", ".", "../x", "a/../../b", "/etc", "uploads", "uploads/certs"] {
            assert!(
                matches!(
                    relative_output_dir(value),
                    Err(WorkspaceError::InvalidOutputDirectory(_))
                ),
                "{value} accepted"
            );
        }
    }

    #[test]
    fn uploads_are_not_public() {
        assert!(is_public_path(Path::new("abc/certs/data.json")));
        assert!(is_public_path(Path::new("abc/certs/site/index.html")));
        assert!(!is_public_path(Path::new("abc/uploads/roster.csv")));
        assert!(!is_public_path(Path::new("abc/uploads")));
        assert!(!is_public_path(Path::new("")));
        assert!(!is_public_path(Path::new("abc/../def/uploads/roster.csv")));
    }

    #[test]
    fn creates_job_layout_and_persists_uploads() {
        let work = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(work.path(), "abc").unwrap();

        assert_eq!(ws.root(), work.path().join("jobs/abc"));
        let saved = ws.persist_upload("roster", "csv", b"Name\nSam\n").unwrap();
        assert_eq!(saved, work.path().join("jobs/abc/uploads/roster.csv"));
        assert_eq!(fs::read(saved).unwrap(), b"Name\nSam\n");

        let out = ws.output_dir(Path::new("certs/2024"));
        assert_eq!(ws.display_relative(&out), "certs/2024");
        assert_eq!(ws.display_relative(&out.join("data.json")), "certs/2024/data.json");
    }
}
