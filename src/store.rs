use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tempfile::Builder;

use crate::domain::EntityKind;
use crate::error::MirrorError;

/// Local mirror layout: `<root>/studies/<id>/` and `<root>/samples/<id>/`.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: Utf8PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: EntityKind) -> Utf8PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn record_dir(&self, kind: EntityKind, id: &str) -> Utf8PathBuf {
        self.kind_dir(kind).join(id)
    }

    pub fn descriptor_path(&self, kind: EntityKind, id: &str) -> Utf8PathBuf {
        self.record_dir(kind, id).join(kind.descriptor_name())
    }

    pub fn record_file(&self, kind: EntityKind, id: &str, name: &str) -> Utf8PathBuf {
        self.record_dir(kind, id).join(name)
    }

    pub fn ensure_layout(&self, kind: EntityKind) -> Result<(), MirrorError> {
        fs::create_dir_all(self.kind_dir(kind).as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn ensure_record(&self, kind: EntityKind, id: &str) -> Result<Utf8PathBuf, MirrorError> {
        let dir = self.record_dir(kind, id);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn is_recorded(&self, kind: EntityKind, id: &str) -> bool {
        self.exists(&self.descriptor_path(kind, id))
    }

    /// Ids and download names become path components under the root; anything
    /// that could climb out of its record directory is refused.
    pub fn checked_name<'n>(context: &str, name: &'n str) -> Result<&'n str, MirrorError> {
        let unsafe_name = name.is_empty()
            || name == "."
            || name.contains("..")
            || name.contains(['/', '\\']);
        if unsafe_name {
            return Err(MirrorError::UnsafeName {
                context: context.to_string(),
                name: name.to_string(),
            });
        }
        Ok(name)
    }

    pub fn write_json(path: &Utf8Path, value: &Value) -> Result<(), MirrorError> {
        let content =
            serde_json::to_vec(value).map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Writes through a temp file in the target directory and renames it into
    /// place, so a file is either absent or complete.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), MirrorError> {
        let parent = path
            .parent()
            .ok_or_else(|| MirrorError::Filesystem(format!("invalid destination {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {parent}: {err}")))?;
        let mut temp = Builder::new()
            .prefix(".mgnify-mirror")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| MirrorError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }
}
