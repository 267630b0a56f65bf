//! 文档存储 - 基础设施层
//!
//! 评分核心只需要按路径读写字节，不管理目录布局。

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    async fn save_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// 本地磁盘存储，相对路径按上传目录解析
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)).await
    }

    async fn save_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(target, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relative_paths_resolve_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        store
            .save_file(Path::new("assignments/1/reference.txt"), b"answer key")
            .await
            .unwrap();

        assert!(dir.path().join("assignments/1/reference.txt").exists());
        assert_eq!(
            store
                .read_file(Path::new("assignments/1/reference.txt"))
                .await
                .unwrap(),
            b"answer key"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        let err = store
            .read_file(Path::new("nope.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
