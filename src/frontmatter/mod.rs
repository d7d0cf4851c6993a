//! Frontmatter & index codec.
//!
//! Task files follow the two-marker envelope: a leading `---` line, a
//! YAML key/value block, a trailing `---` line, then a free-form markdown
//! body. Index files are pure structured YAML documents with no envelope.
//! All writes are atomic per file: write to a sibling temp path in the same
//! directory, fsync, rename — grounded on the same write-temp-rename
//! pattern a sibling backlog tool in this corpus uses for its own index
//! file (`NamedTempFile::new_in` + `sync_all` + `persist`).

pub mod envelope;

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::entity::TaskFrontmatter;
use crate::error::{BacklogError, Result};

/// Write `contents` to `path` atomically: temp file in the same directory,
/// `fsync`, then `rename` over the destination. A reader never observes a
/// partially written file.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| BacklogError::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| BacklogError::io(parent, e))?;
    use std::io::Write;
    temp.write_all(contents.as_bytes())
        .map_err(|e| BacklogError::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| BacklogError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| BacklogError::io(path, e.error))?;
    Ok(())
}

/// Parse a `.todo` task file's frontmatter + body.
pub fn read_task(path: &Path) -> Result<(TaskFrontmatter, String)> {
    let contents = fs::read_to_string(path).map_err(|e| BacklogError::io(path, e))?;
    let (fm_str, body) = envelope::split(&contents).map_err(|reason| {
        BacklogError::MalformedFrontmatter {
            path: path.to_path_buf(),
            reason,
        }
    })?;
    let fm: TaskFrontmatter =
        serde_yaml::from_str(fm_str).map_err(|e| BacklogError::MalformedFrontmatter {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok((fm, body.to_string()))
}

/// Serialize a task's frontmatter + body and write it atomically.
pub fn write_task(path: &Path, fm: &TaskFrontmatter, body: &str) -> Result<()> {
    let yaml = serde_yaml::to_string(fm).map_err(|e| BacklogError::MalformedFrontmatter {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let contents = envelope::join(&yaml, body);
    atomic_write(path, &contents)
}

/// Read a pure-YAML index document (no envelope).
pub fn read_index<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| BacklogError::io(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| BacklogError::MalformedFrontmatter {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Serialize and atomically write a pure-YAML index document.
pub fn write_index<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).map_err(|e| BacklogError::MalformedFrontmatter {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    atomic_write(path, &yaml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Status;
    use crate::id::PathId;

    #[test]
    fn atomic_write_is_observable_only_after_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.yaml");
        atomic_write(&path, "project: demo\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "project: demo\n");

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty(), "no temp file should remain: {leftovers:?}");
    }

    #[test]
    fn task_round_trip_preserves_body_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("T001-demo.todo");
        let mut fm = TaskFrontmatter::new(PathId::parse("P1.M1.E1.T001").unwrap(), "Demo");
        fm.status = Status::InProgress;
        let body = "Some body text.\n\nWith a blank line.\n";
        write_task(&path, &fm, body).unwrap();

        let (read_fm, read_body) = read_task(&path).unwrap();
        assert_eq!(read_fm.id, fm.id);
        assert_eq!(read_fm.status, Status::InProgress);
        assert_eq!(read_body, body);
    }

    #[test]
    fn malformed_frontmatter_is_reported_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.todo");
        fs::write(&path, "no envelope here\n").unwrap();
        let err = read_task(&path).unwrap_err();
        assert_eq!(err.kind(), "MALFORMED_FRONTMATTER");
    }
}
