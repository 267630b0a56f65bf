use crate::models::manifest::GradingManifest;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载评分清单
pub async fn load_manifest(manifest_path: &Path) -> Result<GradingManifest> {
    let content = fs::read_to_string(manifest_path)
        .await
        .with_context(|| format!("无法读取评分清单: {}", manifest_path.display()))?;

    let mut manifest: GradingManifest = toml::from_str(&content)
        .with_context(|| format!("无法解析评分清单: {}", manifest_path.display()))?;

    manifest.file_path = Some(manifest_path.to_string_lossy().to_string());

    for assignment in &manifest.assignments {
        tracing::debug!(
            "加载作业 {} ({}): {} 份提交",
            assignment.id,
            assignment.title,
            assignment.submissions.len()
        );
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_manifest_records_source_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grading.toml");
        std::fs::write(
            &path,
            r#"
[[assignments]]
id = 1
title = "Photosynthesis"
reference_path = "ref.txt"

[[assignments.submissions]]
id = 10
file_path = "s10.txt"
"#,
        )
        .unwrap();

        let manifest = load_manifest(&path).await.unwrap();

        assert_eq!(manifest.submission_count(), 1);
        assert_eq!(
            manifest.file_path.as_deref(),
            Some(path.to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn test_load_manifest_reports_missing_file() {
        let err = load_manifest(Path::new("/nonexistent/grading.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("无法读取评分清单"));
    }
}
