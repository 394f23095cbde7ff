use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use hdlrun_core::{DocumentHandle, EditorHost};

/// Host used by the command line. There is no focused editor: targets are
/// always given explicitly and "opening" one only checks it is a file.
#[derive(Debug, Default)]
pub struct CliHost;

impl CliHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EditorHost for CliHost {
    fn active_file(&self) -> Option<PathBuf> {
        None
    }

    async fn open_file(&self, path: &Path) -> Result<DocumentHandle> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(DocumentHandle::new(path)),
            Ok(_) => bail!("{} is not a file", path.display()),
            Err(_) => bail!("{} does not exist", path.display()),
        }
    }

    fn notify_user(&self, message: &str) {
        eprintln!("hdlrun: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_rejects_missing_and_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let host = CliHost::new();

        let missing = host.open_file(&dir.path().join("top.v")).await;
        assert!(missing.is_err_and(|err| err.to_string().contains("does not exist")));

        let not_file = host.open_file(dir.path()).await;
        assert!(not_file.is_err_and(|err| err.to_string().contains("is not a file")));

        std::fs::write(dir.path().join("top.v"), "module top; endmodule\n")?;
        let doc = host.open_file(&dir.path().join("top.v")).await?;
        assert_eq!(doc.base_name(), "top");
        Ok(())
    }

    #[test]
    fn there_is_no_active_file() {
        assert_eq!(CliHost::new().active_file(), None);
    }
}
