use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

/// A source document opened by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    path: PathBuf,
}

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the document; commands run from here.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// File name without its extension.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Extension including the leading dot, or empty.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }
}

/// Services the hosting editor provides to the controller.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// File currently focused in the editor, if any.
    fn active_file(&self) -> Option<PathBuf>;

    async fn open_file(&self, path: &Path) -> Result<DocumentHandle>;

    /// Show a transient message to the user.
    fn notify_user(&self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn document_splits_name_and_extension() {
        let doc = DocumentHandle::new("/work/rtl/alu.sv");
        assert_eq!(doc.base_name(), "alu");
        assert_eq!(doc.extension(), ".sv");
        assert_eq!(doc.directory(), Path::new("/work/rtl"));
    }

    #[test]
    fn bare_file_name_runs_from_current_directory() {
        let doc = DocumentHandle::new("top.v");
        assert_eq!(doc.directory(), Path::new("."));
        assert_eq!(DocumentHandle::new("Makefile").extension(), "");
    }
}
